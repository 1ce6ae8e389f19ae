// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated instruments answering on a [`MockTransport`](super::MockTransport).

use std::sync::Arc;

use rand::Rng;
use tracing::{error, warn};

use strig_core::{ScaleHeader, ScaleReading, ScaleUnit};
use strig_protocol::{
    format_alicat_value, format_flow_line, format_pressure_line, format_scale_telegram,
    parse_alicat_command, AlicatCode, AlicatFlowUnit, ScaleCommand,
};

use super::state::{MockStateStore, MockUnitState};
use super::Responder;

/// Simulated load-cell scale reporting a random stable weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleResponder;

impl Responder for ScaleResponder {
    fn respond(&self, command: &str) -> Option<String> {
        match ScaleCommand::parse(command)? {
            ScaleCommand::DataRequest => {
                let mut rng = rand::thread_rng();
                let grams = rng.gen_range(10..=10_000) as f64 + rng.gen_range(0..=10) as f64 / 10.0;
                let reading = ScaleReading::new(ScaleHeader::StableWeight, grams, ScaleUnit::Gram);
                format_scale_telegram(&reading, 1)
                    .inspect_err(|e| error!("Mock scale cannot encode {}: {}", grams, e))
                    .ok()
            }
            ScaleCommand::Tare => Some("Z".to_string()),
            ScaleCommand::Units => Some("U".to_string()),
        }
    }
}

fn persist(store: &MockStateStore, unit_id: &str, state: MockUnitState) {
    if let Err(e) = store.save(unit_id, &state) {
        warn!("Mock unit {}: {}", unit_id, e);
    }
}

/// Simulated Alicat mass-flow controller.
#[derive(Debug, Clone)]
pub struct AlicatFlowResponder {
    store: Arc<MockStateStore>,
}

impl AlicatFlowResponder {
    pub fn new(store: Arc<MockStateStore>) -> Self {
        Self { store }
    }
}

impl Responder for AlicatFlowResponder {
    fn respond(&self, command: &str) -> Option<String> {
        let request = parse_alicat_command(command)?;
        let unit_id = request.unit_id.as_str();
        let mut reading = self.store.next_flow(unit_id, &mut rand::thread_rng());

        let line = match request.code {
            Some(AlicatCode::Poll) | Some(AlicatCode::TareFlow) => Some(format_flow_line(&reading)),
            Some(AlicatCode::Setpoint) => {
                let new_setpoint = match request.args.first().map(|a| a.parse::<f64>()) {
                    Some(Ok(v)) if v.is_finite() => v,
                    _ => {
                        error!("Setpoint must be numeric: {:?}", command);
                        return None;
                    }
                };
                let old_setpoint = reading.setpoint.unwrap_or(0.0);
                reading.setpoint = Some(new_setpoint);
                Some(format!(
                    "{} {} {} {} {}",
                    unit_id,
                    format_alicat_value(old_setpoint),
                    format_alicat_value(new_setpoint),
                    AlicatFlowUnit::Slpm.code(),
                    AlicatFlowUnit::Slpm.label()
                ))
            }
            _ => None,
        };

        persist(&self.store, unit_id, MockUnitState::Flow(reading));
        line
    }
}

/// Simulated Alicat differential-pressure sensor. One instance can serve
/// several unit ids on the same line.
#[derive(Debug, Clone)]
pub struct AlicatPressureResponder {
    store: Arc<MockStateStore>,
}

impl AlicatPressureResponder {
    pub fn new(store: Arc<MockStateStore>) -> Self {
        Self { store }
    }
}

impl Responder for AlicatPressureResponder {
    fn respond(&self, command: &str) -> Option<String> {
        let request = parse_alicat_command(command)?;
        let unit_id = request.unit_id.as_str();
        let reading = self.store.next_pressure(unit_id, &mut rand::thread_rng());

        let line = match request.code {
            Some(AlicatCode::Poll) | Some(AlicatCode::TarePressure) => {
                Some(format_pressure_line(&reading))
            }
            _ => None,
        };

        persist(&self.store, unit_id, MockUnitState::Pressure(reading));
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strig_protocol::{decode_flow, decode_pressure, decode_scale, encode_poll, encode_setpoint};

    fn store(dir: &tempfile::TempDir) -> Arc<MockStateStore> {
        Arc::new(MockStateStore::new(dir.path()))
    }

    #[test]
    fn test_scale_telegram_decodes() {
        for _ in 0..20 {
            let line = ScaleResponder.respond("Q\r\n").unwrap();
            let r = decode_scale(&line).unwrap();
            assert_eq!(r.header, ScaleHeader::StableWeight);
            assert_eq!(r.unit, ScaleUnit::Gram);
            assert!((10.0..=10_001.0).contains(&r.value));
        }
        assert_eq!(ScaleResponder.respond("Z\r\n").as_deref(), Some("Z"));
        assert_eq!(ScaleResponder.respond("U").as_deref(), Some("U"));
        assert!(ScaleResponder.respond("X").is_none());
    }

    #[test]
    fn test_flow_poll_generates_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let responder = AlicatFlowResponder::new(store(&dir));

        let line = responder.respond(&encode_poll("A")).unwrap();
        let first = decode_flow(&line).unwrap();
        assert_eq!(first.unit_id, "A");
        assert_eq!(first.setpoint, Some(1000.0));
        assert!(dir.path().join("A.json").exists());

        let line = responder.respond(&encode_poll("A")).unwrap();
        let second = decode_flow(&line).unwrap();
        assert_eq!(second.setpoint, Some(1000.0));
        assert_eq!(second.gas.as_deref(), Some("Air"));
    }

    #[test]
    fn test_setpoint_ack_and_persistence_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let responder = AlicatFlowResponder::new(store(&dir));
        responder.respond(&encode_poll("A")).unwrap();

        let ack = responder.respond(&encode_setpoint("A", 12.5, None)).unwrap();
        assert_eq!(ack, "A +1000.00 +012.50 7 SLPM");

        // A fresh store over the same directory sees the new setpoint.
        let reopened = AlicatFlowResponder::new(store(&dir));
        let line = reopened.respond(&encode_poll("A")).unwrap();
        let r = decode_flow(&line).unwrap();
        assert_eq!(r.setpoint, Some(12.5));
        assert!((r.mass_flow.unwrap() - 12.5).abs() < 2.0);
    }

    #[test]
    fn test_zero_setpoint_stops_mass_flow() {
        let dir = tempfile::tempdir().unwrap();
        let responder = AlicatFlowResponder::new(store(&dir));
        responder.respond(&encode_setpoint("A", 0.0, None)).unwrap();
        let r = decode_flow(&responder.respond(&encode_poll("A")).unwrap()).unwrap();
        assert_eq!(r.setpoint, Some(0.0));
        assert_eq!(r.mass_flow, Some(0.0));
    }

    #[test]
    fn test_bad_setpoint_and_unknown_codes_are_silent() {
        let dir = tempfile::tempdir().unwrap();
        let responder = AlicatFlowResponder::new(store(&dir));
        assert!(responder.respond("ALS abc\r").is_none());
        assert!(responder.respond("ALS\r").is_none());
        assert!(responder.respond("AGS\r").is_none());
        assert!(responder.respond("1\r").is_none());
    }

    #[test]
    fn test_pressure_units_share_one_responder() {
        let dir = tempfile::tempdir().unwrap();
        let responder = AlicatPressureResponder::new(store(&dir));
        let b = decode_pressure(&responder.respond(&encode_poll("B")).unwrap()).unwrap();
        let c = decode_pressure(&responder.respond(&encode_poll("C")).unwrap()).unwrap();
        assert_eq!(b.unit_id, "B");
        assert_eq!(c.unit_id, "C");
        assert!(dir.path().join("B.json").exists());
        assert!(dir.path().join("C.json").exists());
        assert!(responder.respond("BLS 5\r").is_none());
    }
}
