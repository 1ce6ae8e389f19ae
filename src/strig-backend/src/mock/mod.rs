// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated instrument links for development without hardware.
//!
//! A [`MockTransport`] forwards each command to a [`Responder`] and returns
//! whatever it answers. Commands the responder ignores behave like a silent
//! device and fail with a timeout.

pub mod responders;
pub mod state;

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use strig_core::{QueryOptions, RigError, RigResult, Transport, TransportFuture};

/// Produces the reply a simulated device sends for a command.
pub trait Responder: Send + Sync {
    fn respond(&self, command: &str) -> Option<String>;
}

impl<F> Responder for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn respond(&self, command: &str) -> Option<String> {
        self(command)
    }
}

pub struct MockTransport {
    name: String,
    responder: Box<dyn Responder>,
    delay: Duration,
    drop_rate: f64,
    /// Serializes access like a real link and remembers the last write.
    last_written: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>, responder: impl Responder + 'static) -> Self {
        Self {
            name: name.into(),
            responder: Box::new(responder),
            delay: Duration::ZERO,
            drop_rate: 0.0,
            last_written: Mutex::new(None),
        }
    }

    /// Simulated device latency per command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fraction of queries (0..=1) that go unanswered.
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub async fn last_written(&self) -> Option<String> {
        self.last_written.lock().await.clone()
    }

    fn dropped(&self) -> bool {
        self.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.drop_rate)
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn query<'a>(
        &'a self,
        command: &'a str,
        _opts: QueryOptions,
    ) -> TransportFuture<'a, RigResult<String>> {
        Box::pin(async move {
            let _guard = self.last_written.lock().await;
            debug!("{}: sending command {:?}", self.name, command);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.dropped() {
                debug!("{}: simulating drop-out, no data returned", self.name);
                return Err(RigError::timeout());
            }
            match self.responder.respond(command) {
                Some(line) => {
                    debug!("{}: responding with {:?}", self.name, line);
                    Ok(line)
                }
                None => Err(RigError::timeout()),
            }
        })
    }

    fn write_only<'a>(&'a self, command: &'a str) -> TransportFuture<'a, bool> {
        Box::pin(async move {
            let mut last = self.last_written.lock().await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            *last = Some(command.to_string());
            true
        })
    }
}
