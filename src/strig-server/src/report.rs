// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic snapshot reporting to the log and a JSON-lines file.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use strig_core::{DynResult, RigSnapshot};

use crate::config::ReportConfig;
use crate::rig_task::SnapshotRx;

/// Appends flattened snapshots to `<dir>/<timestamp>_<name>.jsonl`.
pub struct SnapshotRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SnapshotRecorder {
    pub fn file_name(name: &str, started: DateTime<Local>) -> String {
        format!("{}_{}.jsonl", started.format("%Y-%m-%d_%H%M%S"), name)
    }

    pub fn open(dir: &Path, name: &str) -> Result<Self, String> {
        create_dir_all(dir)
            .map_err(|e| format!("create report dir '{}': {}", dir.display(), e))?;
        let path = dir.join(Self::file_name(name, Local::now()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("open report '{}': {}", path.display(), e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn from_config(cfg: &ReportConfig) -> Result<Option<Self>, String> {
        if !cfg.enabled {
            return Ok(None);
        }
        Self::open(&cfg.dir, &cfg.name).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, snapshot: &RigSnapshot) {
        let row = Value::Object(snapshot.flatten());
        if serde_json::to_writer(&mut self.writer, &row).is_err() {
            warn!("report serialization failed for {}", self.path.display());
            return;
        }
        if self.writer.write_all(b"\n").is_err() {
            warn!("report write failed for {}", self.path.display());
            return;
        }
        if let Err(e) = self.writer.flush() {
            warn!("report flush failed for {}: {}", self.path.display(), e);
        }
    }
}

/// Report each new snapshot, at most once per `interval`, until the task is
/// cancelled.
pub async fn run_report_loop(
    mut snapshots: SnapshotRx,
    mut recorder: Option<SnapshotRecorder>,
    interval: Duration,
) -> DynResult<()> {
    if let Some(recorder) = recorder.as_ref() {
        info!("Recording snapshots to {}", recorder.path().display());
    }
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !snapshots.has_changed()? {
            debug!("No new snapshot to report");
            continue;
        }
        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };
        let row = Value::Object(snapshot.flatten());
        debug!("Snapshot: {}", row);
        if let Some(recorder) = recorder.as_mut() {
            recorder.record(&snapshot);
        }
    }
}
