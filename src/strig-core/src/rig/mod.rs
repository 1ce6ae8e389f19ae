// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::RigResult;

pub mod event;
pub mod machine;
pub mod policies;
pub mod response;

/// Alias to reduce type complexity in Transport.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-call overrides for a transport query.
///
/// `None` falls back to the transport's configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl QueryOptions {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// A command/response channel to one or more instruments.
///
/// Implementations open lazily and serialize access internally, so a single
/// instance can be shared between drivers behind an `Arc`.
pub trait Transport: Send + Sync {
    /// Label used in log messages.
    fn name(&self) -> &str;

    /// Write `command` and wait for one response line.
    ///
    /// Timeouts and transport errors are retried according to the
    /// transport's retry policy. The error returned after the last attempt
    /// means "no response"; it is never a panic.
    fn query<'a>(
        &'a self,
        command: &'a str,
        opts: QueryOptions,
    ) -> TransportFuture<'a, RigResult<String>>;

    /// Write `command` without waiting for a response.
    fn write_only<'a>(&'a self, command: &'a str) -> TransportFuture<'a, bool>;

    /// Drop the live connection, if any.
    fn close<'a>(&'a self) -> TransportFuture<'a, ()> {
        Box::pin(std::future::ready(()))
    }
}
