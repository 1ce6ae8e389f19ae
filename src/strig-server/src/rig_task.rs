// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Rig orchestrator: owns the four drivers and publishes snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use strig_backend::{
    AlicatFlowResponder, AlicatPressureResponder, DiffPressureSensor, FlowController,
    MockStateStore, MockTransport, Responder, ScaleDriver, ScaleResponder, SerialTransport,
};
use strig_core::{DynResult, RigError, RigMachineState, RigResult, RigSnapshot, Transport};

use crate::config::{AlicatRole, LinkResolution, MockStateConfig, ServerConfig};

pub type SnapshotRx = watch::Receiver<Option<Arc<RigSnapshot>>>;

/// Transports for each instrument role.
pub struct RigLinks {
    pub scale: Arc<dyn Transport>,
    pub flow: Arc<dyn Transport>,
    pub low_dp: Arc<dyn Transport>,
    pub high_dp: Arc<dyn Transport>,
}

impl RigLinks {
    /// Simulated instruments backed by a state directory. Both pressure
    /// sensors answer on one link, like a multi-drop bus.
    pub fn mock(cfg: &MockStateConfig) -> Self {
        let store = Arc::new(MockStateStore::new(cfg.dir.clone()));
        let pressure = mock_link(
            "mock-pressure",
            AlicatPressureResponder::new(store.clone()),
            cfg,
        );
        Self {
            scale: mock_link("mock-scale", ScaleResponder, cfg),
            flow: mock_link("mock-flow", AlicatFlowResponder::new(store), cfg),
            low_dp: pressure.clone(),
            high_dp: pressure,
        }
    }

    /// Serial links. At most one shared transport is created and every role
    /// without a dedicated port gets a handle to it.
    pub fn serial(cfg: &ServerConfig) -> RigResult<Self> {
        let scale_settings = cfg
            .mass
            .serial
            .as_ref()
            .ok_or_else(|| RigError::config("no transport resolvable for role mass"))?;
        let scale: Arc<dyn Transport> =
            Arc::new(SerialTransport::from_settings("mass", scale_settings));

        let mut shared: Option<Arc<dyn Transport>> = None;
        let mut resolve = |role: AlicatRole| -> RigResult<Arc<dyn Transport>> {
            match cfg.resolve_link(role) {
                LinkResolution::Dedicated(settings) => {
                    info!("{}: dedicated link {}", role, settings.port);
                    Ok(Arc::new(SerialTransport::from_settings(role.key(), &settings)))
                }
                LinkResolution::Shared => {
                    let settings = cfg.alicat_shared.serial.as_ref().ok_or_else(|| {
                        RigError::config(format!("no transport resolvable for role {}", role))
                    })?;
                    info!("{}: shared link {}", role, settings.port);
                    let link = shared.get_or_insert_with(|| {
                        let link: Arc<dyn Transport> =
                            Arc::new(SerialTransport::from_settings("alicat-shared", settings));
                        link
                    });
                    Ok(link.clone())
                }
                LinkResolution::Unresolvable(role) => Err(RigError::config(format!(
                    "no transport resolvable for role {}",
                    role
                ))),
            }
        };

        Ok(Self {
            scale,
            flow: resolve(AlicatRole::Flow)?,
            high_dp: resolve(AlicatRole::HighDp)?,
            low_dp: resolve(AlicatRole::LowDp)?,
        })
    }
}

fn mock_link(
    name: &str,
    responder: impl Responder + 'static,
    cfg: &MockStateConfig,
) -> Arc<dyn Transport> {
    Arc::new(
        MockTransport::new(name, responder)
            .with_delay(cfg.latency())
            .with_drop_rate(cfg.drop_rate),
    )
}

/// Four-instrument test rig.
///
/// Snapshots are published all-or-nothing: a cycle where any instrument
/// fails to answer leaves the previous snapshot in place.
pub struct TestRig {
    scale: ScaleDriver,
    flow: FlowController,
    low_dp: DiffPressureSensor,
    high_dp: DiffPressureSensor,
    links: Vec<Arc<dyn Transport>>,
    snapshot_tx: watch::Sender<Option<Arc<RigSnapshot>>>,
    state_tx: watch::Sender<RigMachineState>,
}

impl TestRig {
    pub fn new(links: RigLinks, flow_id: &str, low_dp_id: &str, high_dp_id: &str) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(RigMachineState::default());
        let mut unique: Vec<Arc<dyn Transport>> = Vec::new();
        for link in [&links.scale, &links.flow, &links.low_dp, &links.high_dp] {
            if !unique.iter().any(|known| Arc::ptr_eq(known, link)) {
                unique.push(link.clone());
            }
        }
        Self {
            scale: ScaleDriver::new(links.scale),
            flow: FlowController::new(links.flow, flow_id),
            low_dp: DiffPressureSensor::new(links.low_dp, low_dp_id),
            high_dp: DiffPressureSensor::new(links.high_dp, high_dp_id),
            links: unique,
            snapshot_tx,
            state_tx,
        }
    }

    /// Build the rig described by `cfg`. Link resolution errors are fatal.
    pub fn from_config(cfg: &ServerConfig) -> RigResult<Self> {
        let links = if cfg.mock {
            info!("Using simulated instruments (state in {})", cfg.mock_state.dir.display());
            RigLinks::mock(&cfg.mock_state)
        } else {
            RigLinks::serial(cfg)?
        };
        Ok(Self::new(
            links,
            &cfg.flow.unit_id,
            &cfg.low_dp.unit_id,
            &cfg.high_dp.unit_id,
        ))
    }

    /// Poll every instrument once. Returns `true` when a new snapshot was
    /// published.
    pub async fn update(&self) -> bool {
        let Some(mass) = self.scale.fetch().await else {
            return abandon("mass");
        };
        let Some(flow) = self.flow.fetch().await else {
            return abandon("flow");
        };
        let Some(low_dp) = self.low_dp.fetch().await else {
            return abandon("low_dp");
        };
        let Some(high_dp) = self.high_dp.fetch().await else {
            return abandon("high_dp");
        };

        let snapshot = RigSnapshot::new(mass, flow, low_dp, high_dp);
        self.snapshot_tx.send_replace(Some(Arc::new(snapshot)));
        true
    }

    pub async fn change_setpoint(&self, value: f64) -> bool {
        self.flow.write_setpoint(value, None).await
    }

    pub async fn tare_scale(&self) -> bool {
        self.scale.tare().await
    }

    pub async fn tare_alicat(&self, role: AlicatRole) -> bool {
        match role {
            AlicatRole::Flow => self.flow.tare_flow().await,
            AlicatRole::LowDp => self.low_dp.tare().await,
            AlicatRole::HighDp => self.high_dp.tare().await,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<RigSnapshot>> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotRx {
        self.snapshot_tx.subscribe()
    }

    pub fn machine_state(&self) -> RigMachineState {
        *self.state_tx.borrow()
    }

    /// Publish a machine state. Returns `false` if it was already current.
    pub fn publish_state(&self, state: RigMachineState) -> bool {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    /// Close every distinct link.
    pub async fn close(&self) {
        for link in &self.links {
            link.close().await;
        }
    }
}

fn abandon(role: &str) -> bool {
    debug!("Update abandoned: no {} reading", role);
    false
}

/// Poll the rig every `interval` until the task is cancelled.
pub async fn run_update_loop(rig: Arc<TestRig>, interval: Duration) -> DynResult<()> {
    info!("Update loop started (every {:?})", interval);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u64 = 0;
    loop {
        ticker.tick().await;
        if rig.update().await {
            if failures > 0 {
                info!("Rig readings recovered after {} incomplete cycles", failures);
                failures = 0;
            }
        } else {
            failures += 1;
            if failures == 1 || failures % 10 == 0 {
                warn!("Incomplete rig cycle ({} in a row)", failures);
            }
        }
    }
}
