// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for strig-server.
//!
//! Config is loaded from the `[strig-server]` section of `st-test-rig.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./st-test-rig.toml`
//! 3. `~/.config/st-test-rig/st-test-rig.toml`
//! 4. `/etc/st-test-rig/st-test-rig.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strig_app::{parse_log_level, ConfigError, ConfigFile};
use strig_backend::SerialSettings;
use strig_core::ScaleUnit;
use strig_protocol::AlicatPressureUnit;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulate all instruments instead of opening serial ports
    pub mock: bool,
    /// General settings
    pub general: GeneralConfig,
    /// Loop periods, interlock and event retry behavior
    pub behavior: BehaviorConfig,
    /// Load-cell scale
    pub mass: ScaleConfig,
    /// Mass-flow controller
    pub flow: AlicatConfig,
    /// High-range differential-pressure sensor
    pub high_dp: AlicatConfig,
    /// Low-range differential-pressure sensor (drives the interlock)
    pub low_dp: AlicatConfig,
    /// Multi-drop line used by Alicat units without their own serial
    pub alicat_shared: SharedLinkConfig,
    /// Where simulated units keep their state
    pub mock_state: MockStateConfig,
    /// Periodic snapshot reporting
    pub report: ReportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mock: false,
            general: GeneralConfig::default(),
            behavior: BehaviorConfig::default(),
            mass: ScaleConfig::default(),
            flow: AlicatConfig::new("A", 0.0, 1000.0),
            high_dp: AlicatConfig::new("C", 0.0, 100.0),
            low_dp: AlicatConfig::new("B", 0.0, 25.0),
            alicat_shared: SharedLinkConfig::default(),
            mock_state: MockStateConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Behavior configuration for the periodic loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Instrument polling period in milliseconds
    pub update_interval_ms: u64,
    /// Safety interlock check period in milliseconds
    pub supervisory_interval_ms: u64,
    /// Fraction of low_dp full scale that trips the interlock
    pub shutoff_fraction: f64,
    /// Minimum seconds between two interlock shutoff requests
    pub shutoff_debounce_secs: u64,
    /// Attempts before a retried event is dead-lettered
    pub event_max_attempts: u32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            supervisory_interval_ms: 1000,
            shutoff_fraction: 0.95,
            shutoff_debounce_secs: 30,
            event_max_attempts: 5,
        }
    }
}

impl BehaviorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn supervisory_interval(&self) -> Duration {
        Duration::from_millis(self.supervisory_interval_ms)
    }

    pub fn shutoff_debounce(&self) -> Duration {
        Duration::from_secs(self.shutoff_debounce_secs)
    }
}

/// Scale configuration. The scale never shares its line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Unit the scale is set up to report in
    pub units: ScaleUnit,
    pub serial: Option<SerialSettings>,
}

/// Configuration common to all Alicat instruments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlicatConfig {
    /// Multi-drop address ('A'..'Z')
    pub unit_id: String,
    pub full_scale_min: f64,
    pub full_scale_max: f64,
    pub pressure_unit: AlicatPressureUnit,
    /// Dedicated line; falls back to `[alicat_shared]` when absent
    pub serial: Option<SerialSettings>,
}

impl AlicatConfig {
    pub fn new(unit_id: &str, full_scale_min: f64, full_scale_max: f64) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            full_scale_min,
            full_scale_max,
            pressure_unit: AlicatPressureUnit::default(),
            serial: None,
        }
    }
}

impl Default for AlicatConfig {
    fn default() -> Self {
        Self::new("A", 0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedLinkConfig {
    pub serial: Option<SerialSettings>,
}

/// Simulated instrument behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockStateConfig {
    /// Directory holding one JSON record per unit id
    pub dir: PathBuf,
    /// Simulated response latency in milliseconds
    pub latency_ms: u64,
    /// Fraction of queries (0..=1) left unanswered
    pub drop_rate: f64,
}

impl Default for MockStateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".mock"),
            latency_ms: 0,
            drop_rate: 0.0,
        }
    }
}

impl MockStateConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Snapshot reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Append snapshots to a JSON-lines file
    pub enabled: bool,
    /// Reporting period in milliseconds
    pub interval_ms: u64,
    /// Output directory
    pub dir: PathBuf,
    /// Suffix of the output file name
    pub name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 10_000,
            dir: PathBuf::from("records"),
            name: "records".to_string(),
        }
    }
}

impl ReportConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Instrument roles that read from an Alicat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlicatRole {
    Flow,
    HighDp,
    LowDp,
}

impl AlicatRole {
    pub const ALL: [AlicatRole; 3] = [Self::Flow, Self::HighDp, Self::LowDp];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::HighDp => "high_dp",
            Self::LowDp => "low_dp",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == key)
    }
}

impl std::fmt::Display for AlicatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Which link an Alicat role talks over.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkResolution {
    Dedicated(SerialSettings),
    Shared,
    Unresolvable(AlicatRole),
}

/// A dedicated link wins over the shared one.
pub fn resolve_link(
    role: AlicatRole,
    own: Option<&SerialSettings>,
    shared: Option<&SerialSettings>,
) -> LinkResolution {
    match (own, shared) {
        (Some(settings), _) => LinkResolution::Dedicated(settings.clone()),
        (None, Some(_)) => LinkResolution::Shared,
        (None, None) => LinkResolution::Unresolvable(role),
    }
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "strig-server"
    }
}

impl ServerConfig {
    pub fn alicat(&self, role: AlicatRole) -> &AlicatConfig {
        match role {
            AlicatRole::Flow => &self.flow,
            AlicatRole::HighDp => &self.high_dp,
            AlicatRole::LowDp => &self.low_dp,
        }
    }

    pub fn resolve_link(&self, role: AlicatRole) -> LinkResolution {
        resolve_link(
            role,
            self.alicat(role).serial.as_ref(),
            self.alicat_shared.serial.as_ref(),
        )
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        validate_behavior(&self.behavior)?;

        for role in AlicatRole::ALL {
            validate_alicat(role, self.alicat(role))?;
        }
        if !(0.0..=1.0).contains(&self.mock_state.drop_rate) {
            return Err("[mock_state].drop_rate must be in range [0, 1]".to_string());
        }
        if self.report.interval_ms == 0 {
            return Err("[report].interval_ms must be > 0".to_string());
        }
        if self.report.enabled && self.report.dir.as_os_str().is_empty() {
            return Err("[report].dir must not be empty when reporting is enabled".to_string());
        }

        if self.mock {
            return Ok(());
        }

        match &self.mass.serial {
            Some(serial) => serial.validate().map_err(|e| format!("[mass.serial] {}", e))?,
            None => return Err("[mass].serial is required unless mock = true".to_string()),
        }
        if let Some(serial) = &self.alicat_shared.serial {
            serial
                .validate()
                .map_err(|e| format!("[alicat_shared.serial] {}", e))?;
        }
        for role in AlicatRole::ALL {
            match self.resolve_link(role) {
                LinkResolution::Dedicated(serial) => serial
                    .validate()
                    .map_err(|e| format!("[{}.serial] {}", role, e))?,
                LinkResolution::Shared => {}
                LinkResolution::Unresolvable(role) => {
                    return Err(format!(
                        "[{}] has no serial and [alicat_shared].serial is not set",
                        role
                    ))
                }
            }
        }
        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Generate an example configuration wrapped under the `[strig-server]`
    /// section header.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "strig-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            mass: ScaleConfig {
                units: ScaleUnit::Gram,
                serial: Some(SerialSettings {
                    port: "/dev/ttyUSB0".to_string(),
                    ..SerialSettings::default()
                }),
            },
            alicat_shared: SharedLinkConfig {
                serial: Some(SerialSettings {
                    port: "/dev/ttyUSB1".to_string(),
                    ..SerialSettings::default()
                }),
            },
            ..ServerConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        Some(name) if parse_log_level(name).is_none() => Err(format!(
            "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
            name
        )),
        _ => Ok(()),
    }
}

fn validate_behavior(behavior: &BehaviorConfig) -> Result<(), String> {
    if behavior.update_interval_ms == 0 {
        return Err("[behavior].update_interval_ms must be > 0".to_string());
    }
    if behavior.supervisory_interval_ms == 0 {
        return Err("[behavior].supervisory_interval_ms must be > 0".to_string());
    }
    if !(behavior.shutoff_fraction > 0.0 && behavior.shutoff_fraction <= 1.0) {
        return Err("[behavior].shutoff_fraction must be in range (0, 1]".to_string());
    }
    if behavior.event_max_attempts == 0 {
        return Err("[behavior].event_max_attempts must be > 0".to_string());
    }
    Ok(())
}

fn validate_alicat(role: AlicatRole, cfg: &AlicatConfig) -> Result<(), String> {
    let mut chars = cfg.unit_id.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => {}
        _ => {
            return Err(format!(
                "[{}].unit_id '{}' must be a single letter A-Z",
                role, cfg.unit_id
            ))
        }
    }
    if !cfg.full_scale_min.is_finite() || !cfg.full_scale_max.is_finite() {
        return Err(format!("[{}] full scale bounds must be finite", role));
    }
    if cfg.full_scale_max <= cfg.full_scale_min {
        return Err(format!(
            "[{}].full_scale_max must be greater than full_scale_min",
            role
        ));
    }
    Ok(())
}
