// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Instrument links and device drivers.

pub mod drivers;
pub mod mock;
pub mod serial;

pub use drivers::{DiffPressureSensor, FlowController, ScaleDriver};
pub use mock::responders::{AlicatFlowResponder, AlicatPressureResponder, ScaleResponder};
pub use mock::state::{MockStateStore, MockUnitState};
pub use mock::{MockTransport, Responder};
pub use serial::{
    AsyncStream, BoxedStream, Connector, DataBits, Parity, SerialConnector, SerialSettings, SerialTransport,
    StopBits,
};
