// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device drivers.
//!
//! A driver binds one transport, one codec and one unit id. Failures are
//! logged and surface as `None`/`false`; nothing here returns an error to the
//! orchestrator.

use std::sync::Arc;

use tracing::{debug, error, warn};

use strig_core::{FlowReading, PressureReading, QueryOptions, ScaleReading, Transport};
use strig_protocol::{
    decode_flow, decode_pressure, decode_scale, encode_poll, encode_setpoint, encode_tare_flow,
    encode_tare_pressure, AlicatFlowUnit, ScaleCommand,
};

/// Send `command` and return the response line, logging failures.
async fn poll(transport: &dyn Transport, command: &str) -> Option<String> {
    match transport.query(command, QueryOptions::default()).await {
        Ok(line) => {
            debug!("{}: received line {:?}", transport.name(), line);
            Some(line)
        }
        Err(e) => {
            warn!("{}: no data received: {}", transport.name(), e);
            None
        }
    }
}

/// A command counts as accepted when any non-empty line comes back.
async fn acknowledged(transport: &dyn Transport, command: &str) -> bool {
    poll(transport, command)
        .await
        .is_some_and(|line| !line.trim().is_empty())
}

/// On a multi-drop line a reply from another unit is never ours.
fn addressed_to(expected: &str, actual: &str, line: &str) -> bool {
    if actual == expected {
        return true;
    }
    error!(
        "Unit {} answered with a line from unit {}: {:?}",
        expected, actual, line
    );
    false
}

/// Load-cell scale.
pub struct ScaleDriver {
    transport: Arc<dyn Transport>,
}

impl ScaleDriver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self) -> Option<ScaleReading> {
        let line = poll(self.transport.as_ref(), &ScaleCommand::DataRequest.encode()).await?;
        decode_scale(&line)
            .inspect_err(|e| error!("Unable to parse scale line {:?}: {}", line, e))
            .ok()
    }

    /// Zero the scale. The scale does not acknowledge tare.
    pub async fn tare(&self) -> bool {
        self.transport
            .write_only(&ScaleCommand::Tare.encode())
            .await
    }
}

/// Alicat mass-flow controller.
pub struct FlowController {
    transport: Arc<dyn Transport>,
    unit_id: String,
}

impl FlowController {
    pub fn new(transport: Arc<dyn Transport>, unit_id: impl Into<String>) -> Self {
        Self {
            transport,
            unit_id: unit_id.into(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub async fn fetch(&self) -> Option<FlowReading> {
        let line = poll(self.transport.as_ref(), &encode_poll(&self.unit_id)).await?;
        let reading = decode_flow(&line)
            .inspect_err(|e| error!("Unable to parse line {:?}: {}", line, e))
            .ok()?;
        addressed_to(&self.unit_id, &reading.unit_id, &line).then_some(reading)
    }

    pub async fn write_setpoint(&self, value: f64, units: Option<AlicatFlowUnit>) -> bool {
        let ok = acknowledged(
            self.transport.as_ref(),
            &encode_setpoint(&self.unit_id, value, units),
        )
        .await;
        if !ok {
            error!("Unable to write setpoint {} to flow controller {}", value, self.unit_id);
        }
        ok
    }

    pub async fn tare_flow(&self) -> bool {
        acknowledged(self.transport.as_ref(), &encode_tare_flow(&self.unit_id)).await
    }
}

/// Alicat differential-pressure sensor.
pub struct DiffPressureSensor {
    transport: Arc<dyn Transport>,
    unit_id: String,
}

impl DiffPressureSensor {
    pub fn new(transport: Arc<dyn Transport>, unit_id: impl Into<String>) -> Self {
        Self {
            transport,
            unit_id: unit_id.into(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub async fn fetch(&self) -> Option<PressureReading> {
        let line = poll(self.transport.as_ref(), &encode_poll(&self.unit_id)).await?;
        let reading = decode_pressure(&line)
            .inspect_err(|e| error!("Unable to parse line {:?}: {}", line, e))
            .ok()?;
        addressed_to(&self.unit_id, &reading.unit_id, &line).then_some(reading)
    }

    pub async fn tare(&self) -> bool {
        acknowledged(self.transport.as_ref(), &encode_tare_pressure(&self.unit_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use strig_core::{ScaleHeader, ScaleUnit};

    fn mock(responder: fn(&str) -> Option<String>) -> Arc<dyn Transport> {
        Arc::new(MockTransport::new("mock", responder))
    }

    fn scripted(command: &str) -> Option<String> {
        match command {
            "Q\r\n" => Some("ST,+00123.45  g".to_string()),
            "A\r" => Some("A +001.23 +020.00 +045.00 +1000.00 +1000.00 +12500.0 Air HLD".to_string()),
            "B\r" => Some("B +000.50".to_string()),
            "C\r" => Some("garbage".to_string()),
            "E\r" => Some("B +099.00".to_string()),
            "F\r" => Some("B +001.00 +020.00 +045.00 +999.00".to_string()),
            "ALS 5\r" => Some("A +1000.00 +005.00 7 SLPM".to_string()),
            "AV\r" | "BP\r" => Some("ok".to_string()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_scale_fetch_and_tare() {
        let t = Arc::new(MockTransport::new("scale", scripted));
        let scale = ScaleDriver::new(t.clone());
        let r = scale.fetch().await.unwrap();
        assert_eq!(r.header, ScaleHeader::StableWeight);
        assert_eq!(r.value, 123.45);
        assert_eq!(r.unit, ScaleUnit::Gram);

        assert!(scale.tare().await);
        assert_eq!(t.last_written().await.as_deref(), Some("Z\r\n"));
    }

    #[tokio::test]
    async fn test_flow_fetch_and_setpoint() {
        let flow = FlowController::new(mock(scripted), "A");
        let r = flow.fetch().await.unwrap();
        assert_eq!(r.mass_flow, Some(1000.0));
        assert_eq!(r.totalized_flow, Some(12500.0));
        assert!(flow.write_setpoint(5.0, None).await);
        assert!(!flow.write_setpoint(6.0, None).await);
        assert!(flow.tare_flow().await);
    }

    #[tokio::test]
    async fn test_pressure_fetch() {
        let low = DiffPressureSensor::new(mock(scripted), "B");
        assert_eq!(low.fetch().await.unwrap().pressure, Some(0.5));
        assert!(low.tare().await);
    }

    #[tokio::test]
    async fn test_decode_failure_is_none() {
        let bad = DiffPressureSensor::new(mock(scripted), "C");
        assert!(bad.fetch().await.is_none());
    }

    #[tokio::test]
    async fn test_reply_from_other_unit_is_none() {
        let high = DiffPressureSensor::new(mock(scripted), "E");
        assert!(high.fetch().await.is_none());
        let flow = FlowController::new(mock(scripted), "F");
        assert!(flow.fetch().await.is_none());
    }

    #[tokio::test]
    async fn test_no_response_is_none() {
        let silent = FlowController::new(mock(scripted), "D");
        assert!(silent.fetch().await.is_none());
        assert!(!silent.tare_flow().await);
    }
}
