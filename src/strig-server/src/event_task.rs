// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Event queue and the task that drains it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use strig_core::{
    DynResult, QueuedEvent, RigError, RigEvent, RigMachineState, RigResult, RigStateMachine,
};

use crate::rig_task::TestRig;

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<QueuedEvent>,
}

impl EventQueue {
    /// Returns `false` once the handler is gone.
    pub fn push(&self, event: QueuedEvent) -> bool {
        debug!("Queueing {} event {}", event.event.name(), event.id);
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                warn!("Event handler stopped, dropping {} event {}", event.event.name(), event.id);
                false
            }
        }
    }
}

/// What happened to one dequeued event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Handled,
    /// Failed and went back to the tail of the queue.
    Requeued { attempts: u32 },
    /// Failed without retry, or a `Null` event.
    Dropped,
    /// Failed its final attempt.
    DeadLettered,
    Failed(RigError),
}

pub struct EventHandler {
    rig: Arc<TestRig>,
    queue: EventQueue,
    rx: mpsc::UnboundedReceiver<QueuedEvent>,
    machine: RigStateMachine,
    max_attempts: u32,
}

impl EventHandler {
    pub fn new(rig: Arc<TestRig>, max_attempts: u32) -> (Self, EventQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = EventQueue { tx };
        let handler = Self {
            rig,
            queue: queue.clone(),
            rx,
            machine: RigStateMachine::new(),
            max_attempts: max_attempts.max(1),
        };
        (handler, queue)
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<QueuedEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain the queue until the task is cancelled.
    pub async fn run(mut self) -> DynResult<()> {
        info!("Event handler started");
        while let Some(event) = self.rx.recv().await {
            self.process(event).await;
        }
        info!("Event handler stopping (queue closed)");
        Ok(())
    }

    /// Dispatch one event and apply the retry rules to the result.
    pub async fn process(&mut self, queued: QueuedEvent) -> EventOutcome {
        if queued.event == RigEvent::Null {
            debug!("Dropping null event {}", queued.id);
            return EventOutcome::Dropped;
        }

        match self.handle(&queued.event).await {
            Ok(true) => {
                debug!("Handled {} event {}", queued.event.name(), queued.id);
                EventOutcome::Handled
            }
            Ok(false) if !queued.retry => {
                warn!(
                    "{} event {} failed, not retrying",
                    queued.event.name(),
                    queued.id
                );
                EventOutcome::Dropped
            }
            Ok(false) => {
                let queued = queued.next_attempt();
                if queued.attempts >= self.max_attempts {
                    error!(
                        "{} event {} dead-lettered after {} attempts: {:?}",
                        queued.event.name(),
                        queued.id,
                        queued.attempts,
                        queued.event
                    );
                    return EventOutcome::DeadLettered;
                }
                let attempts = queued.attempts;
                warn!(
                    "{} event {} failed (attempt {}/{}), requeueing",
                    queued.event.name(),
                    queued.id,
                    attempts,
                    self.max_attempts
                );
                self.queue.push(queued);
                EventOutcome::Requeued { attempts }
            }
            Err(e) => {
                error!("Error handling {} event {}: {}", queued.event.name(), queued.id, e);
                EventOutcome::Failed(e)
            }
        }
    }

    async fn handle(&mut self, event: &RigEvent) -> RigResult<bool> {
        match event {
            RigEvent::StateChange { new_state } => {
                if self.machine.transition(*new_state) {
                    info!("Rig state -> {}", new_state);
                }
                self.rig.publish_state(*new_state);
                Ok(true)
            }
            RigEvent::StopButton => {
                info!("Stop requested");
                self.queue
                    .push(QueuedEvent::state_change(RigMachineState::Idle, true));
                Ok(true)
            }
            RigEvent::ChangeSetpoint { value } => {
                if !value.is_finite() || *value < 0.0 {
                    return Err(RigError::invalid_params(format!(
                        "setpoint {} must be a finite non-negative number",
                        value
                    )));
                }
                info!("Changing setpoint to {}", value);
                Ok(self.rig.change_setpoint(*value).await)
            }
            RigEvent::Null => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig_task::RigLinks;
    use strig_backend::MockTransport;
    use strig_core::{RigErrorKind, Transport};

    fn flow_only(command: &str) -> Option<String> {
        match command {
            "ALS 5\r" => Some("A +000.00 +005.00 7 SLPM".to_string()),
            _ => None,
        }
    }

    fn handler(max_attempts: u32) -> (EventHandler, EventQueue) {
        let t: Arc<dyn Transport> = Arc::new(MockTransport::new("scripted", flow_only));
        let links = RigLinks {
            scale: t.clone(),
            flow: t.clone(),
            low_dp: t.clone(),
            high_dp: t,
        };
        EventHandler::new(Arc::new(TestRig::new(links, "A", "B", "C")), max_attempts)
    }

    #[tokio::test]
    async fn test_setpoint_success() {
        let (mut h, _queue) = handler(5);
        let outcome = h.process(QueuedEvent::change_setpoint(5.0, true)).await;
        assert_eq!(outcome, EventOutcome::Handled);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_setpoint_without_retry_is_dropped() {
        let (mut h, _queue) = handler(5);
        let outcome = h.process(QueuedEvent::change_setpoint(7.0, false)).await;
        assert_eq!(outcome, EventOutcome::Dropped);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retry_requeues_at_tail_then_dead_letters() {
        let (mut h, queue) = handler(3);
        assert!(queue.push(QueuedEvent::change_setpoint(7.0, true)));
        assert!(queue.push(QueuedEvent::null()));

        let first = h.rx.try_recv().unwrap();
        let id = first.id;
        assert_eq!(h.process(first).await, EventOutcome::Requeued { attempts: 1 });

        // The null event queued earlier comes out before the retry.
        let null = h.rx.try_recv().unwrap();
        assert_eq!(null.event, RigEvent::Null);
        assert_eq!(h.process(null).await, EventOutcome::Dropped);

        let second = h.rx.try_recv().unwrap();
        assert_eq!(second.id, id);
        assert_eq!(second.attempts, 1);
        assert_eq!(h.process(second).await, EventOutcome::Requeued { attempts: 2 });

        let third = h.rx.try_recv().unwrap();
        assert_eq!(h.process(third).await, EventOutcome::DeadLettered);
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_setpoint_is_error_and_lost() {
        let (mut h, _queue) = handler(5);
        for value in [-1.0, f64::NAN, f64::INFINITY] {
            match h.process(QueuedEvent::change_setpoint(value, true)).await {
                EventOutcome::Failed(e) => assert_eq!(e.kind, RigErrorKind::InvalidParams),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_button_enqueues_idle_state_change() {
        let (mut h, _queue) = handler(5);
        let outcome = h
            .process(QueuedEvent::state_change(RigMachineState::Running, false))
            .await;
        assert_eq!(outcome, EventOutcome::Handled);
        assert_eq!(h.machine.state(), RigMachineState::Running);
        assert_eq!(h.rig.machine_state(), RigMachineState::Running);

        assert_eq!(h.process(QueuedEvent::stop_button()).await, EventOutcome::Handled);
        let follow_up = h.rx.try_recv().unwrap();
        assert_eq!(
            follow_up.event,
            RigEvent::StateChange {
                new_state: RigMachineState::Idle
            }
        );
        assert!(follow_up.retry);

        assert_eq!(h.process(follow_up).await, EventOutcome::Handled);
        assert_eq!(h.machine.state(), RigMachineState::Idle);
        assert_eq!(h.rig.machine_state(), RigMachineState::Idle);
    }

    #[tokio::test]
    async fn test_run_drains_queue() {
        let (h, queue) = handler(5);
        let rig = h.rig.clone();
        let task = tokio::spawn(h.run());

        queue.push(QueuedEvent::state_change(RigMachineState::Fault, false));
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while rig.machine_state() != RigMachineState::Fault {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        task.abort();
    }

    #[tokio::test]
    async fn test_push_after_handler_dropped() {
        let (h, queue) = handler(5);
        drop(h);
        assert!(!queue.push(QueuedEvent::stop_button()));
    }
}
