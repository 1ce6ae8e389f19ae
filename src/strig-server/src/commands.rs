// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operator commands read line by line from stdin.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{info, warn};

use strig_core::{DynResult, QueuedEvent, RigMachineState};

use crate::config::AlicatRole;
use crate::event_task::EventQueue;
use crate::rig_task::TestRig;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Setpoint(f64),
    Stop,
    Run,
    /// `None` tares the scale.
    Tare(Option<AlicatRole>),
    Quit,
}

/// Blank lines parse as `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "setpoint" | "sp" => {
            let arg = words
                .next()
                .ok_or_else(|| "usage: setpoint <value>".to_string())?;
            let value = arg
                .parse::<f64>()
                .map_err(|_| format!("setpoint '{}' is not a number", arg))?;
            Command::Setpoint(value)
        }
        "stop" => Command::Stop,
        "run" => Command::Run,
        "tare" => match words.next() {
            None | Some("mass") => Command::Tare(None),
            Some(target) => Command::Tare(Some(
                AlicatRole::from_key(&target.to_ascii_lowercase())
                    .ok_or_else(|| format!("cannot tare '{}'", target))?,
            )),
        },
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}'", other)),
    };
    if words.next().is_some() {
        return Err(format!("unexpected arguments after '{}'", verb));
    }
    Ok(Some(command))
}

/// Turn operator input into events until EOF or `quit`.
pub async fn run_command_loop<R>(
    reader: R,
    rig: Arc<TestRig>,
    queue: EventQueue,
    shutdown_tx: Arc<watch::Sender<bool>>,
) -> DynResult<()>
where
    R: AsyncBufRead + Unpin,
{
    info!("Reading commands from stdin (setpoint <value>, stop, run, tare [flow|low_dp|high_dp], quit)");
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("Ignoring input {:?}: {}", line, e);
                continue;
            }
        };
        match command {
            Command::Setpoint(value) => {
                queue.push(QueuedEvent::change_setpoint(value, true));
            }
            Command::Stop => {
                queue.push(QueuedEvent::stop_button());
            }
            Command::Run => {
                queue.push(QueuedEvent::state_change(RigMachineState::Running, false));
            }
            Command::Tare(None) => {
                if rig.tare_scale().await {
                    info!("Scale tared");
                } else {
                    warn!("Scale tare failed");
                }
            }
            Command::Tare(Some(role)) => {
                if rig.tare_alicat(role).await {
                    info!("{} tared", role);
                } else {
                    warn!("{} tare failed", role);
                }
            }
            Command::Quit => {
                info!("Quit requested");
                let _ = shutdown_tx.send(true);
                return Ok(());
            }
        }
    }
    info!("stdin closed, no more commands");
    Ok(())
}
