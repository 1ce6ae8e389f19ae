// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Over-pressure interlock on the low-range differential-pressure sensor.

use std::time::{Duration, Instant};

use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use strig_core::{DynResult, PressureReading, QueuedEvent};

use crate::config::ServerConfig;
use crate::event_task::EventQueue;
use crate::rig_task::SnapshotRx;

/// Requests a zero flow setpoint when low-dp pressure reaches a fraction of
/// its full scale. Requests are rate limited by a debounce window and the
/// interlock never clears itself.
#[derive(Debug, Clone)]
pub struct SupervisoryMonitor {
    threshold: f64,
    debounce: Duration,
    last_shutoff: Option<Instant>,
}

impl SupervisoryMonitor {
    pub fn new(full_scale_max: f64, fraction: f64, debounce: Duration) -> Self {
        Self {
            threshold: fraction * full_scale_max,
            debounce,
            last_shutoff: None,
        }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self::new(
            cfg.low_dp.full_scale_max,
            cfg.behavior.shutoff_fraction,
            cfg.behavior.shutoff_debounce(),
        )
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn check(&mut self, low_dp: &PressureReading, now: Instant) -> Option<QueuedEvent> {
        let pressure = low_dp.pressure?;
        if pressure < self.threshold {
            return None;
        }
        if let Some(last) = self.last_shutoff {
            if now.saturating_duration_since(last) < self.debounce {
                info!(
                    "low_dp {} over threshold {}, shutoff already requested",
                    pressure, self.threshold
                );
                return None;
            }
        }
        warn!(
            "low_dp {} over threshold {}, requesting flow shutoff",
            pressure, self.threshold
        );
        self.last_shutoff = Some(now);
        Some(QueuedEvent::change_setpoint(0.0, true))
    }
}

/// Check the latest snapshot every `interval` until the task is cancelled.
pub async fn run_supervisory_loop(
    snapshots: SnapshotRx,
    queue: EventQueue,
    mut monitor: SupervisoryMonitor,
    interval: Duration,
) -> DynResult<()> {
    info!(
        "Supervisory monitor started (threshold {}, every {:?})",
        monitor.threshold(),
        interval
    );
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(snapshot) = snapshots.borrow().clone() else {
            continue;
        };
        let now = time::Instant::now().into_std();
        if let Some(event) = monitor.check(&snapshot.low_dp, now) {
            if !queue.push(event) {
                return Err("event queue closed".into());
            }
        }
    }
}
