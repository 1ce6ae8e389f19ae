// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Alicat polling protocol.
//!
//! Responses are whitespace-separated ASCII tokens. Token 0 is the unit id,
//! token 1 the pressure; mass-flow controllers append temperature,
//! volumetric flow, mass flow, setpoint, totalized flow, gas and status.
//! Numeric tokens that do not parse become `None`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use strig_core::{FlowReading, PressureReading, RigError, RigResult};

/// Written for a numeric field the reading does not carry.
const MISSING_TOKEN: &str = "--";

static COMMAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*(?P<id>[A-Za-z])(?P<rest>.*)").expect("Invalid Alicat command regex")
});

/// Engineering units for flow commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlicatFlowUnit {
    #[serde(rename = "SLPM")]
    Slpm,
}

impl AlicatFlowUnit {
    pub fn code(&self) -> u8 {
        match self {
            Self::Slpm => 7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Slpm => "SLPM",
        }
    }
}

/// Engineering units for pressure readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlicatPressureUnit {
    #[serde(rename = "Pa")]
    Pa,
    #[serde(rename = "kPa")]
    KPa,
    #[serde(rename = "MPa")]
    MPa,
    #[serde(rename = "mbar")]
    Mbar,
    #[serde(rename = "bar")]
    Bar,
    #[default]
    #[serde(rename = "PSI")]
    Psi,
    #[serde(rename = "inH2O")]
    InH2O,
}

impl AlicatPressureUnit {
    pub fn code(&self) -> u8 {
        match self {
            Self::Pa => 2,
            Self::KPa => 4,
            Self::MPa => 5,
            Self::Mbar => 6,
            Self::Bar => 7,
            Self::Psi => 10,
            Self::InH2O => 20,
        }
    }
}

impl fmt::Display for AlicatPressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pa => "Pa",
            Self::KPa => "kPa",
            Self::MPa => "MPa",
            Self::Mbar => "mbar",
            Self::Bar => "bar",
            Self::Psi => "PSI",
            Self::InH2O => "inH2O",
        };
        f.write_str(label)
    }
}

/// Command codes following the unit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlicatCode {
    Poll,
    Setpoint,
    TareFlow,
    TarePressure,
    ActiveGas,
}

impl AlicatCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "",
            Self::Setpoint => "LS",
            Self::TareFlow => "V",
            Self::TarePressure => "P",
            Self::ActiveGas => "GS",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "" => Some(Self::Poll),
            "LS" => Some(Self::Setpoint),
            "V" => Some(Self::TareFlow),
            "P" => Some(Self::TarePressure),
            "GS" => Some(Self::ActiveGas),
            _ => None,
        }
    }
}

/// A command line split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct AlicatRequest {
    pub unit_id: String,
    /// `None` for codes this crate does not know.
    pub code: Option<AlicatCode>,
    pub raw_code: String,
    pub args: Vec<String>,
}

pub fn encode_poll(unit_id: &str) -> String {
    format!("{}{}\r", unit_id, AlicatCode::Poll.as_str())
}

pub fn encode_setpoint(unit_id: &str, value: f64, units: Option<AlicatFlowUnit>) -> String {
    match units {
        Some(u) => format!(
            "{}{} {} {}\r",
            unit_id,
            AlicatCode::Setpoint.as_str(),
            value,
            u.code()
        ),
        None => format!("{}{} {}\r", unit_id, AlicatCode::Setpoint.as_str(), value),
    }
}

pub fn encode_tare_flow(unit_id: &str) -> String {
    format!("{}{}\r", unit_id, AlicatCode::TareFlow.as_str())
}

pub fn encode_tare_pressure(unit_id: &str) -> String {
    format!("{}{}\r", unit_id, AlicatCode::TarePressure.as_str())
}

/// Split an incoming command into unit id, code and arguments.
pub fn parse_alicat_command(command: &str) -> Option<AlicatRequest> {
    let caps = COMMAND_REGEX.captures(command)?;
    let unit_id = caps.name("id")?.as_str().to_string();
    let mut tokens = caps.name("rest").map_or("", |m| m.as_str()).split_whitespace();
    let raw_code = tokens.next().unwrap_or_default().to_string();
    let args = tokens.map(str::to_string).collect();
    Some(AlicatRequest {
        unit_id,
        code: AlicatCode::from_code(&raw_code),
        raw_code,
        args,
    })
}

fn coerce(token: Option<&&str>) -> Option<f64> {
    token
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn tokenize(line: &str, min_tokens: usize) -> RigResult<Vec<&str>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < min_tokens {
        return Err(RigError::parse(format!(
            "invalid Alicat response (too short): {:?}",
            line
        )));
    }
    Ok(tokens)
}

/// Decode a differential-pressure response.
pub fn decode_pressure(line: &str) -> RigResult<PressureReading> {
    let tokens = tokenize(line, 2)?;
    Ok(PressureReading::new(tokens[0], coerce(tokens.get(1))))
}

/// Decode a mass-flow controller response.
pub fn decode_flow(line: &str) -> RigResult<FlowReading> {
    let tokens = tokenize(line, 4)?;
    let mut reading = FlowReading::new(tokens[0], coerce(tokens.get(1)));
    reading.temp = coerce(tokens.get(2));
    reading.volumetric_flow = coerce(tokens.get(3));
    reading.mass_flow = coerce(tokens.get(4));
    reading.setpoint = coerce(tokens.get(5));
    reading.totalized_flow = coerce(tokens.get(6));
    reading.gas = tokens.get(7).map(|t| t.to_string());
    reading.status = tokens.get(8).map(|t| t.to_string());
    Ok(reading)
}

/// Sign, six zero-padded characters, two decimals.
pub fn format_alicat_value(value: f64) -> String {
    format!("{:+07.2}", value)
}

fn format_totalized(value: f64) -> String {
    format!("{:+07.1}", value)
}

fn push_numeric(tokens: &mut Vec<String>, value: Option<f64>, fmt: fn(f64) -> String) {
    tokens.push(value.map_or_else(|| MISSING_TOKEN.to_string(), fmt));
}

/// Trailing absent fields are left off the line.
fn join_trimmed(mut tokens: Vec<String>, min_tokens: usize) -> String {
    while tokens.len() > min_tokens && tokens.last().is_some_and(|t| t == MISSING_TOKEN) {
        tokens.pop();
    }
    tokens.join(" ")
}

pub fn format_pressure_line(reading: &PressureReading) -> String {
    let mut tokens = vec![reading.unit_id.clone()];
    push_numeric(&mut tokens, reading.pressure, format_alicat_value);
    tokens.join(" ")
}

pub fn format_flow_line(reading: &FlowReading) -> String {
    let mut tokens = vec![reading.unit_id.clone()];
    push_numeric(&mut tokens, reading.pressure, format_alicat_value);
    push_numeric(&mut tokens, reading.temp, format_alicat_value);
    push_numeric(&mut tokens, reading.volumetric_flow, format_alicat_value);
    push_numeric(&mut tokens, reading.mass_flow, format_alicat_value);
    push_numeric(&mut tokens, reading.setpoint, format_alicat_value);
    push_numeric(&mut tokens, reading.totalized_flow, format_totalized);
    match (&reading.gas, &reading.status) {
        (Some(gas), Some(status)) => {
            tokens.push(gas.clone());
            tokens.push(status.clone());
        }
        (Some(gas), None) => tokens.push(gas.clone()),
        (None, Some(status)) => {
            tokens.push(MISSING_TOKEN.to_string());
            tokens.push(status.clone());
        }
        (None, None) => {}
    }
    join_trimmed(tokens, 4)
}
