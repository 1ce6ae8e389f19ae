// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Events accepted by the rig event handler.

use serde::Serialize;
use uuid::Uuid;

use crate::reading::unix_timestamp;
use crate::rig::machine::RigMachineState;

/// A request that changes the rig's state or outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RigEvent {
    StateChange { new_state: RigMachineState },
    StopButton,
    ChangeSetpoint { value: f64 },
    /// Placeholder event; dropped on receipt.
    Null,
}

impl RigEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "StateChange",
            Self::StopButton => "StopButton",
            Self::ChangeSetpoint { .. } => "ChangeSetpoint",
            Self::Null => "Null",
        }
    }
}

/// An event as it travels through the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedEvent {
    pub id: Uuid,
    pub event: RigEvent,
    pub timestamp: f64,
    /// Re-enqueue on failure instead of dropping.
    pub retry: bool,
    /// Failed attempts so far.
    pub attempts: u32,
}

impl QueuedEvent {
    pub fn new(event: RigEvent, retry: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            timestamp: unix_timestamp(),
            retry,
            attempts: 0,
        }
    }

    pub fn state_change(new_state: RigMachineState, retry: bool) -> Self {
        Self::new(RigEvent::StateChange { new_state }, retry)
    }

    /// Stop requests are always retried.
    pub fn stop_button() -> Self {
        Self::new(RigEvent::StopButton, true)
    }

    pub fn change_setpoint(value: f64, retry: bool) -> Self {
        Self::new(RigEvent::ChangeSetpoint { value }, retry)
    }

    pub fn null() -> Self {
        Self::new(RigEvent::Null, false)
    }

    /// The same event with one more failed attempt recorded.
    pub fn next_attempt(mut self) -> Self {
        self.attempts += 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = QueuedEvent::null();
        let b = QueuedEvent::null();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let ev = QueuedEvent::change_setpoint(10.0, true);
        let id = ev.id;
        let again = ev.next_attempt().next_attempt();
        assert_eq!(again.id, id);
        assert_eq!(again.attempts, 2);
        assert_eq!(again.event, RigEvent::ChangeSetpoint { value: 10.0 });
    }

    #[test]
    fn test_stop_button_retries() {
        assert!(QueuedEvent::stop_button().retry);
        assert_eq!(QueuedEvent::stop_button().event.name(), "StopButton");
    }
}
