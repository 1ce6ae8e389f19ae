// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire codecs for the rig instruments.
//!
//! Two line-oriented ASCII protocols are supported: the load-cell scale
//! telegram and the Alicat polling protocol shared by the flow controller and
//! the differential-pressure sensors.

pub mod alicat;
pub mod scale;

pub use alicat::{
    decode_flow, decode_pressure, encode_poll, encode_setpoint, encode_tare_flow,
    encode_tare_pressure, format_alicat_value, format_flow_line, format_pressure_line,
    parse_alicat_command, AlicatCode, AlicatFlowUnit, AlicatPressureUnit, AlicatRequest,
};
pub use scale::{decode_scale, format_scale_telegram, ScaleCommand};
