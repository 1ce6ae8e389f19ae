// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod reading;
pub mod rig;
pub mod snapshot;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use reading::{FlowReading, PressureReading, ScaleHeader, ScaleReading, ScaleUnit};
pub use rig::event::{QueuedEvent, RigEvent};
pub use rig::machine::{RigMachineState, RigStateMachine};
pub use rig::response::{RigError, RigErrorKind, RigResult};
pub use rig::{QueryOptions, Transport, TransportFuture};
pub use snapshot::RigSnapshot;
