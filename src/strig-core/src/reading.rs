// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Instrument readings.
//!
//! One reading type per instrument family. Optional fields stay `None` when
//! the instrument did not send the corresponding token; they are never
//! defaulted to zero.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current wall-clock time as seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Data header of a scale telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleHeader {
    #[serde(rename = "ST")]
    StableWeight,
    #[serde(rename = "QT")]
    StableCount,
    #[serde(rename = "US")]
    UnstableWeight,
    #[serde(rename = "OL")]
    OverLimit,
}

impl ScaleHeader {
    pub const ALL: [ScaleHeader; 4] = [
        Self::StableWeight,
        Self::StableCount,
        Self::UnstableWeight,
        Self::OverLimit,
    ];

    /// Two-letter wire code (upper case).
    pub fn code(&self) -> &'static str {
        match self {
            Self::StableWeight => "ST",
            Self::StableCount => "QT",
            Self::UnstableWeight => "US",
            Self::OverLimit => "OL",
        }
    }

    /// Case-insensitive lookup of a wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for ScaleHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Weighing unit reported by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleUnit {
    #[default]
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "pc")]
    Pieces,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "oz")]
    Ounce,
    #[serde(rename = "lb")]
    Pound,
    #[serde(rename = "ozt")]
    TroyOunce,
    #[serde(rename = "tl")]
    Tael,
}

impl ScaleUnit {
    pub const ALL: [ScaleUnit; 8] = [
        Self::Gram,
        Self::Kilogram,
        Self::Pieces,
        Self::Percent,
        Self::Ounce,
        Self::Pound,
        Self::TroyOunce,
        Self::Tael,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Gram => "g",
            Self::Kilogram => "kg",
            Self::Pieces => "pc",
            Self::Percent => "%",
            Self::Ounce => "oz",
            Self::Pound => "lb",
            Self::TroyOunce => "ozt",
            Self::Tael => "tl",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|u| u.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for ScaleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One decoded scale telegram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleReading {
    pub header: ScaleHeader,
    pub value: f64,
    pub unit: ScaleUnit,
    pub timestamp: f64,
}

impl ScaleReading {
    pub fn new(header: ScaleHeader, value: f64, unit: ScaleUnit) -> Self {
        Self {
            header,
            value,
            unit,
            timestamp: unix_timestamp(),
        }
    }
}

/// Reading from an Alicat differential-pressure sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureReading {
    pub unit_id: String,
    pub pressure: Option<f64>,
    pub timestamp: f64,
}

impl PressureReading {
    pub fn new(unit_id: impl Into<String>, pressure: Option<f64>) -> Self {
        Self {
            unit_id: unit_id.into(),
            pressure,
            timestamp: unix_timestamp(),
        }
    }
}

/// Reading from an Alicat mass-flow controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReading {
    pub unit_id: String,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
    pub volumetric_flow: Option<f64>,
    pub mass_flow: Option<f64>,
    pub setpoint: Option<f64>,
    pub totalized_flow: Option<f64>,
    pub gas: Option<String>,
    pub status: Option<String>,
    pub timestamp: f64,
}

impl FlowReading {
    /// A reading carrying only the mandatory fields.
    pub fn new(unit_id: impl Into<String>, pressure: Option<f64>) -> Self {
        Self {
            unit_id: unit_id.into(),
            pressure,
            temp: None,
            volumetric_flow: None,
            mass_flow: None,
            setpoint: None,
            totalized_flow: None,
            gas: None,
            status: None,
            timestamp: unix_timestamp(),
        }
    }
}
