// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scale telegram codec.
//!
//! A data telegram has the fixed layout `HH,±DDDDDDDDUUU`: a two-letter
//! header, a comma, a sign, eight characters of digits and decimal point, and
//! a unit right-aligned in three characters.

use std::sync::LazyLock;

use regex::Regex;

use strig_core::{RigError, RigResult, ScaleHeader, ScaleReading, ScaleUnit};

const TELEGRAM_LEN: usize = 15;
const VALUE_WIDTH: usize = 8;

static TELEGRAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z]{2},[+-][0-9.]{8}[a-z %]{3}").expect("Invalid scale telegram regex")
});

/// Commands understood by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCommand {
    DataRequest,
    Tare,
    Units,
}

impl ScaleCommand {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataRequest => "Q",
            Self::Tare => "Z",
            Self::Units => "U",
        }
    }

    /// Command line as written to the port.
    pub fn encode(&self) -> String {
        format!("{}\r\n", self.code())
    }

    /// Parse a received command, ignoring surrounding whitespace.
    pub fn parse(command: &str) -> Option<Self> {
        match command.trim() {
            "Q" => Some(Self::DataRequest),
            "Z" => Some(Self::Tare),
            "U" => Some(Self::Units),
            _ => None,
        }
    }
}

/// Locate and decode a data telegram anywhere in `line`.
pub fn decode_scale(line: &str) -> RigResult<ScaleReading> {
    let telegram = TELEGRAM_REGEX
        .find(line)
        .ok_or_else(|| RigError::parse(format!("failed to parse scale packet: {:?}", line)))?
        .as_str();

    if telegram.len() != TELEGRAM_LEN {
        return Err(RigError::parse(format!(
            "{:?} is of unexpected length",
            telegram
        )));
    }

    let (header, rhs) = telegram
        .split_once(',')
        .ok_or_else(|| RigError::parse(format!("missing separator in {:?}", telegram)))?;
    let (number, unit) = rhs.split_at(VALUE_WIDTH + 1);

    let header = ScaleHeader::from_code(header)
        .ok_or_else(|| RigError::parse(format!("{} is invalid header", header)))?;
    let value: f64 = number
        .parse()
        .map_err(|_| RigError::parse(format!("{} is not a number", number)))?;
    let unit = unit.trim();
    let unit = ScaleUnit::from_code(unit)
        .ok_or_else(|| RigError::parse(format!("{:?} is invalid unit", unit)))?;

    Ok(ScaleReading::new(header, value, unit))
}

/// Encode a reading as a data telegram with `decimals` fractional digits.
///
/// Fails when the value does not fit the eight-character field.
pub fn format_scale_telegram(reading: &ScaleReading, decimals: usize) -> RigResult<String> {
    let sign = if reading.value.is_sign_negative() { '-' } else { '+' };
    let number = format!(
        "{:0width$.prec$}",
        reading.value.abs(),
        width = VALUE_WIDTH,
        prec = decimals
    );
    if number.len() != VALUE_WIDTH || !reading.value.is_finite() {
        return Err(RigError::invalid_params(format!(
            "{} does not fit a scale telegram",
            reading.value
        )));
    }
    Ok(format!(
        "{},{}{}{:>3}",
        reading.header.code(),
        sign,
        number,
        reading.unit.code()
    ))
}
