// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name of the shared configuration file.
pub const CONFIG_FILE_NAME: &str = "st-test-rig.toml";
const CONFIG_DIR_NAME: &str = "st-test-rig";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Current directory, then the XDG config dir, then `/etc`.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    paths
}

/// `Ok(None)` when `key` is not a section of the file.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

/// A settings struct stored as one section of the shared config file.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn section_key() -> &'static str;

    /// A file without the section is an error here.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// First file among `paths` holding the section, else the defaults.
    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in paths {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(path, Self::section_key())? {
                    return Ok((cfg, Some(path.clone())));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Search the default paths (CWD → XDG → /etc).
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Bench {
        name: String,
        count: u32,
    }

    impl Default for Bench {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                count: 1,
            }
        }
    }

    impl ConfigFile for Bench {
        fn section_key() -> &'static str {
            "bench"
        }
    }

    #[test]
    fn test_section_defaults_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[bench]\ncount = 5\n").unwrap();
        let cfg = Bench::load_from_file(&path).unwrap();
        assert_eq!(cfg.count, 5);
        assert_eq!(cfg.name, "default");
    }

    #[test]
    fn test_missing_section_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[other]\ncount = 5\n").unwrap();
        assert!(matches!(
            Bench::load_from_file(&path),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn test_search_skips_files_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        std::fs::write(&first, "[other]\n").unwrap();
        std::fs::write(&second, "[bench]\nname = \"rig\"\n").unwrap();
        let missing = dir.path().join("missing.toml");

        let (cfg, found) =
            Bench::load_from_paths(&[missing, first, second.clone()]).unwrap();
        assert_eq!(cfg.name, "rig");
        assert_eq!(found, Some(second));

        let (cfg, found) = Bench::load_from_paths(&[]).unwrap();
        assert_eq!(cfg, Bench::default());
        assert!(found.is_none());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[bench\n").unwrap();
        assert!(matches!(
            Bench::load_from_file(&path),
            Err(ConfigError::ParseError(..))
        ));
    }
}
