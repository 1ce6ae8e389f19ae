// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persisted state of simulated Alicat units.
//!
//! Each unit id maps to one JSON file under the store directory. The first
//! poll of a unit synthesizes plausible values; later polls reload the file
//! and let the numbers drift a little so the data looks alive.

use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use strig_core::reading::unix_timestamp;
use strig_core::{FlowReading, PressureReading, RigError, RigResult};

/// Relative standard deviation of the per-poll drift.
const DRIFT: f64 = 0.05;
/// Standard deviation of mass flow around the setpoint.
const MASS_FLOW_SD: f64 = 0.2;

/// Last simulated reading of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MockUnitState {
    Flow(FlowReading),
    Pressure(PressureReading),
}

/// Directory-backed store of [`MockUnitState`] records.
#[derive(Debug, Clone)]
pub struct MockStateStore {
    dir: PathBuf,
}

impl MockStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, unit_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", unit_id))
    }

    /// Missing or unreadable records load as `None`.
    pub fn load(&self, unit_id: &str) -> Option<MockUnitState> {
        let path = self.path_for(unit_id);
        let data = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring corrupt mock state {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, unit_id: &str, state: &MockUnitState) -> RigResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            RigError::communication(format!(
                "failed to create mock dir {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let json = serde_json::to_string(state)
            .map_err(|e| RigError::communication(format!("failed to encode mock state: {}", e)))?;
        let path = self.path_for(unit_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                RigError::communication(format!("failed to write {}: {}", path.display(), e))
            })
    }

    /// Load the flow state of `unit_id`, drifted, or synthesize a new one.
    pub fn next_flow<R: Rng>(&self, unit_id: &str, rng: &mut R) -> FlowReading {
        match self.load(unit_id) {
            Some(MockUnitState::Flow(mut reading)) => {
                drift_flow(&mut reading, rng);
                reading
            }
            _ => generate_flow(unit_id, rng),
        }
    }

    /// Load the pressure state of `unit_id`, drifted, or synthesize a new one.
    pub fn next_pressure<R: Rng>(&self, unit_id: &str, rng: &mut R) -> PressureReading {
        match self.load(unit_id) {
            Some(MockUnitState::Pressure(mut reading)) => {
                drift_pressure(&mut reading, rng);
                reading
            }
            _ => generate_pressure(unit_id, rng),
        }
    }
}

/// Normal sample via the Box-Muller transform.
pub fn gauss<R: Rng>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + sd * z
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn drifted<R: Rng>(rng: &mut R, value: Option<f64>, decimals: i32) -> Option<f64> {
    value.map(|v| round_to(gauss(rng, v, (v * DRIFT).abs()), decimals))
}

pub fn generate_pressure<R: Rng>(unit_id: &str, rng: &mut R) -> PressureReading {
    PressureReading::new(unit_id, Some(round_to(rng.gen_range(0.8..=1.6), 2)))
}

pub fn generate_flow<R: Rng>(unit_id: &str, rng: &mut R) -> FlowReading {
    let mut reading = FlowReading::new(unit_id, Some(round_to(rng.gen_range(0.8..=1.6), 2)));
    reading.temp = Some(round_to(rng.gen_range(15.0..=25.0), 2));
    reading.volumetric_flow = Some(round_to(rng.gen_range(40.0..=50.0), 2));
    reading.mass_flow = Some(round_to(gauss(rng, 1000.0, 1.0), 2));
    reading.setpoint = Some(1000.0);
    reading.totalized_flow = Some(round_to(rng.gen_range(12000.0..=13000.0), 1));
    reading.gas = Some("Air".to_string());
    reading.status = Some("HLD".to_string());
    reading
}

pub fn drift_pressure<R: Rng>(reading: &mut PressureReading, rng: &mut R) {
    reading.pressure = drifted(rng, reading.pressure, 2);
    reading.timestamp = unix_timestamp();
}

/// Setpoint is held; mass flow tracks the setpoint.
pub fn drift_flow<R: Rng>(reading: &mut FlowReading, rng: &mut R) {
    reading.pressure = drifted(rng, reading.pressure, 2);
    reading.temp = drifted(rng, reading.temp, 2);
    reading.volumetric_flow = drifted(rng, reading.volumetric_flow, 2);
    reading.totalized_flow = drifted(rng, reading.totalized_flow, 1);
    let setpoint = reading.setpoint.unwrap_or(0.0);
    reading.mass_flow = Some(if setpoint > 0.0 {
        round_to(gauss(rng, setpoint, MASS_FLOW_SD).abs(), 2)
    } else {
        0.0
    });
    reading.timestamp = unix_timestamp();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_flow_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let r = generate_flow("A", &mut rng);
            let p = r.pressure.unwrap();
            assert!((0.8..=1.6).contains(&p));
            assert!((15.0..=25.0).contains(&r.temp.unwrap()));
            assert!((40.0..=50.0).contains(&r.volumetric_flow.unwrap()));
            assert!((12000.0..=13000.0).contains(&r.totalized_flow.unwrap()));
            assert!((r.mass_flow.unwrap() - 1000.0).abs() < 10.0);
            assert_eq!(r.setpoint, Some(1000.0));
            assert_eq!(r.gas.as_deref(), Some("Air"));
            assert_eq!(r.status.as_deref(), Some("HLD"));
        }
    }

    #[test]
    fn test_drift_holds_setpoint_and_tracks_mass_flow() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut r = generate_flow("A", &mut rng);
        r.setpoint = Some(250.0);
        for _ in 0..20 {
            drift_flow(&mut r, &mut rng);
            assert_eq!(r.setpoint, Some(250.0));
            assert!((r.mass_flow.unwrap() - 250.0).abs() < 2.0);
        }

        r.setpoint = Some(0.0);
        drift_flow(&mut r, &mut rng);
        assert_eq!(r.mass_flow, Some(0.0));
    }

    #[test]
    fn test_drift_rounds_to_wire_precision() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut r = generate_flow("A", &mut rng);
        drift_flow(&mut r, &mut rng);
        let p = r.pressure.unwrap();
        assert_eq!(p, round_to(p, 2));
        let t = r.totalized_flow.unwrap();
        assert_eq!(t, round_to(t, 1));
    }

    #[test]
    fn test_store_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockStateStore::new(dir.path().join("mock"));
        assert!(store.load("A").is_none());

        let mut pressure = PressureReading::new("A", Some(1.25));
        pressure.timestamp = 100.0;
        let state = MockUnitState::Pressure(pressure);
        store.save("A", &state).unwrap();
        assert_eq!(store.load("A"), Some(state));

        let other = MockStateStore::new(dir.path().join("mock"));
        let mut flow = FlowReading::new("A", Some(1.0));
        flow.setpoint = Some(5.0);
        flow.timestamp = 200.5;
        other.save("A", &MockUnitState::Flow(flow.clone())).unwrap();
        assert_eq!(store.load("A"), Some(MockUnitState::Flow(flow)));
    }

    #[test]
    fn test_corrupt_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("B.json"), "{not json").unwrap();
        let store = MockStateStore::new(dir.path());
        assert!(store.load("B").is_none());

        let mut rng = StdRng::seed_from_u64(1);
        let r = store.next_pressure("B", &mut rng);
        assert!(r.pressure.is_some());
    }

    #[test]
    fn test_next_flow_ignores_pressure_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockStateStore::new(dir.path());
        store
            .save("A", &MockUnitState::Pressure(PressureReading::new("A", Some(1.0))))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let r = store.next_flow("A", &mut rng);
        assert_eq!(r.setpoint, Some(1000.0));
    }

    #[test]
    fn test_simulated_readings_survive_the_wire() {
        use strig_protocol::{decode_flow, decode_pressure, format_flow_line, format_pressure_line};

        let mut rng = StdRng::seed_from_u64(42);
        for unit in ["A", "B", "C"] {
            let mut flow = generate_flow(unit, &mut rng);
            let mut pressure = generate_pressure(unit, &mut rng);
            for step in 0..500 {
                if step % 100 == 50 {
                    flow.setpoint = Some(0.0);
                } else if step % 100 == 0 {
                    flow.setpoint = Some(rng.gen_range(1.0..=1000.0f64).round());
                }
                drift_flow(&mut flow, &mut rng);
                drift_pressure(&mut pressure, &mut rng);

                let line = format_flow_line(&flow);
                let mut decoded = decode_flow(&line).unwrap();
                decoded.timestamp = flow.timestamp;
                assert_eq!(decoded, flow, "{:?}", line);

                let line = format_pressure_line(&pressure);
                let mut decoded = decode_pressure(&line).unwrap();
                decoded.timestamp = pressure.timestamp;
                assert_eq!(decoded, pressure, "{:?}", line);
            }
        }
    }
}
