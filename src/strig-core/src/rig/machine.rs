// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Rig operating state.
//!
//! The rig has no hardware lifecycle of its own; the machine only records
//! which operating state was last requested so the rest of the system can
//! observe it.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Operating state requested for the rig.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RigMachineState {
    #[default]
    Idle,
    Running,
    Fault,
}

impl fmt::Display for RigMachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Fault => write!(f, "Fault"),
        }
    }
}

/// Tracks the current operating state and its transition history.
#[derive(Debug, Clone)]
pub struct RigStateMachine {
    state: RigMachineState,
    transition_count: u64,
    last_transition: Option<Instant>,
}

impl Default for RigStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RigStateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            state: RigMachineState::Idle,
            transition_count: 0,
            last_transition: None,
        }
    }

    pub fn state(&self) -> RigMachineState {
        self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Record a requested state. Returns true if the state changed.
    ///
    /// Every state is reachable from every other one.
    pub fn transition(&mut self, new_state: RigMachineState) -> bool {
        if new_state == self.state {
            return false;
        }
        self.state = new_state;
        self.transition_count += 1;
        self.last_transition = Some(Instant::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let sm = RigStateMachine::new();
        assert_eq!(sm.state(), RigMachineState::Idle);
        assert_eq!(sm.transition_count(), 0);
        assert!(sm.time_in_state().is_none());
    }

    #[test]
    fn test_transition_counts_changes_only() {
        let mut sm = RigStateMachine::new();
        assert!(sm.transition(RigMachineState::Running));
        assert!(!sm.transition(RigMachineState::Running));
        assert!(sm.transition(RigMachineState::Fault));
        assert!(sm.transition(RigMachineState::Idle));
        assert_eq!(sm.transition_count(), 3);
        assert!(sm.time_in_state().is_some());
    }
}
