// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

/// Broad classification of a rig error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RigErrorKind {
    /// No response within the query timeout.
    Timeout,
    /// Open/read/write failure on the underlying link.
    Communication,
    /// Malformed or short instrument response.
    Parse,
    /// Configuration cannot be turned into a working rig.
    Config,
    /// Command arguments are out of range.
    InvalidParams,
}

/// Error type returned by rig operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigError {
    pub kind: RigErrorKind,
    pub message: String,
}

pub type RigResult<T> = Result<T, RigError>;

impl RigError {
    pub fn new(kind: RigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(RigErrorKind::Timeout, "timed out waiting for response")
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(RigErrorKind::Communication, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(RigErrorKind::Parse, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(RigErrorKind::Config, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RigErrorKind::InvalidParams, message)
    }

    /// Timeouts and link failures may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, RigErrorKind::Timeout | RigErrorKind::Communication)
    }

    /// Link failures leave the connection in an unknown state.
    pub fn invalidates_connection(&self) -> bool {
        self.kind == RigErrorKind::Communication
    }
}

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RigError {}

impl From<std::io::Error> for RigError {
    fn from(value: std::io::Error) -> Self {
        RigError::communication(value.to_string())
    }
}
