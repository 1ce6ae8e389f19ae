// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;
use serde_json::{Map, Value};

use crate::reading::{unix_timestamp, FlowReading, PressureReading, ScaleReading};

const SCALE_EXCLUDE: &[&str] = &["timestamp", "header", "unit"];
const ALICAT_EXCLUDE: &[&str] = &["timestamp", "unit_id"];

/// Consistent set of readings from all four instruments.
///
/// Built only when every instrument answered in the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigSnapshot {
    pub timestamp: f64,
    pub mass: ScaleReading,
    pub flow: FlowReading,
    pub low_dp: PressureReading,
    pub high_dp: PressureReading,
}

impl RigSnapshot {
    pub fn new(
        mass: ScaleReading,
        flow: FlowReading,
        low_dp: PressureReading,
        high_dp: PressureReading,
    ) -> Self {
        Self {
            timestamp: unix_timestamp(),
            mass,
            flow,
            low_dp,
            high_dp,
        }
    }

    /// Flatten into a single-level map for data sinks.
    ///
    /// Emits `time` plus each reading's fields prefixed by role name.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("time".to_string(), Value::from(self.timestamp));
        flatten_into(&mut out, "mass", &self.mass, SCALE_EXCLUDE);
        flatten_into(&mut out, "flow", &self.flow, ALICAT_EXCLUDE);
        flatten_into(&mut out, "low_dp", &self.low_dp, ALICAT_EXCLUDE);
        flatten_into(&mut out, "high_dp", &self.high_dp, ALICAT_EXCLUDE);
        out
    }
}

fn flatten_into<T: Serialize>(
    out: &mut Map<String, Value>,
    prefix: &str,
    reading: &T,
    exclude: &[&str],
) {
    let Ok(Value::Object(fields)) = serde_json::to_value(reading) else {
        return;
    };
    for (key, value) in fields {
        if exclude.contains(&key.as_str()) {
            continue;
        }
        out.insert(format!("{}_{}", prefix, key), value);
    }
}
