// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod commands;
mod config;
mod event_task;
mod report;
mod rig_task;
mod supervisor;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use strig_app::init_logging;
use strig_core::DynResult;

use config::ServerConfig;
use event_task::EventHandler;
use report::SnapshotRecorder;
use rig_task::TestRig;
use supervisor::SupervisoryMonitor;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - scale and Alicat test rig");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Simulate all instruments (overrides the config file)
    #[arg(long = "mock")]
    mock: bool,
    /// Read operator commands from stdin
    #[arg(long = "stdin-commands")]
    stdin_commands: bool,
}

type TaskSet = JoinSet<(&'static str, DynResult<()>)>;

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            return;
        }
    }
}

/// Spawn `task` so that it also ends when shutdown is signalled.
fn spawn_task<F>(
    tasks: &mut TaskSet,
    name: &'static str,
    shutdown_rx: watch::Receiver<bool>,
    task: F,
) where
    F: Future<Output = DynResult<()>> + Send + 'static,
{
    tasks.spawn(async move {
        let result = tokio::select! {
            result = task => result,
            _ = wait_for_shutdown(shutdown_rx) => Ok(()),
        };
        (name, result)
    });
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    if cli.mock {
        cfg.mock = true;
    }
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!(
        "Starting st-test-rig (mock: {}, flow {}, low_dp {}, high_dp {})",
        cfg.mock, cfg.flow.unit_id, cfg.low_dp.unit_id, cfg.high_dp.unit_id
    );
    info!(
        "Units: mass {}, flow pressure {}, low_dp {}, high_dp {}",
        cfg.mass.units, cfg.flow.pressure_unit, cfg.low_dp.pressure_unit, cfg.high_dp.pressure_unit
    );

    let rig = Arc::new(TestRig::from_config(&cfg)?);
    let (handler, queue) = EventHandler::new(rig.clone(), cfg.behavior.event_max_attempts);
    let monitor = SupervisoryMonitor::from_config(&cfg);
    let recorder = SnapshotRecorder::from_config(&cfg.report)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let mut tasks: TaskSet = JoinSet::new();

    spawn_task(
        &mut tasks,
        "update",
        shutdown_rx.clone(),
        rig_task::run_update_loop(rig.clone(), cfg.behavior.update_interval()),
    );
    spawn_task(&mut tasks, "events", shutdown_rx.clone(), handler.run());
    spawn_task(
        &mut tasks,
        "supervisor",
        shutdown_rx.clone(),
        supervisor::run_supervisory_loop(
            rig.subscribe(),
            queue.clone(),
            monitor,
            cfg.behavior.supervisory_interval(),
        ),
    );
    spawn_task(
        &mut tasks,
        "report",
        shutdown_rx.clone(),
        report::run_report_loop(rig.subscribe(), recorder, cfg.report.interval()),
    );
    if cli.stdin_commands {
        spawn_task(
            &mut tasks,
            "commands",
            shutdown_rx.clone(),
            commands::run_command_loop(
                BufReader::new(tokio::io::stdin()),
                rig.clone(),
                queue.clone(),
                shutdown_tx.clone(),
            ),
        );
    }

    let mut failure: Option<String> = None;
    loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                info!("Ctrl+C received, shutting down");
                break;
            }
            _ = wait_for_shutdown(shutdown_rx.clone()) => {
                info!("Shutdown requested");
                break;
            }
            joined = tasks.join_next() => match joined {
                Some(Ok((name, Ok(())))) => info!("{} task finished", name),
                Some(Ok((name, Err(e)))) => {
                    error!("{} task failed: {}", name, e);
                    failure = Some(format!("{} task failed: {}", name, e));
                    break;
                }
                Some(Err(e)) => {
                    error!("Task aborted: {}", e);
                    failure = Some(format!("task aborted: {}", e));
                    break;
                }
                None => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    rig.close().await;
    if let Some(snapshot) = rig.snapshot() {
        info!("Last complete snapshot at {:.3}", snapshot.timestamp);
    }
    info!("Stopped (rig state {})", rig.machine_state());

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
