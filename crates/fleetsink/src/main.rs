// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fleet telemetry bridge CLI
//!
//! Bridges a pub/sub message stream into relational storage. Messages
//! arrive on stdin as `topic payload` lines (the `mosquitto_sub -v` output
//! format), so the broker stays an external process on the other side of
//! a pipe.
//!
//! # Usage
//!
//! ```bash
//! # Validate a routing table
//! fleetsink --config routes.json check
//!
//! # Bridge a live MQTT subscription
//! mosquitto_sub -v -t 'cars/telemetry' | fleetsink --config routes.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetsink::{store_path, Bridge, RoutingTable};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fleetsink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fleet telemetry bridge - pub/sub payloads into relational storage", long_about = None)]
struct Args {
    /// Routing table (JSON)
    #[arg(short, long, default_value = "fleetsink.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the routing table and print its destinations
    Check {
        /// Also show which destinations a given topic would reach
        #[arg(short, long)]
        topic: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if let Some(cmd) = args.command {
        return handle_command(cmd, &args.config);
    }

    tracing::info!("Fleet telemetry bridge starting...");
    tracing::info!("  Routing table: {}", args.config.display());

    let bridge = Bridge::open(&args.config)
        .with_context(|| format!("Cannot start bridge from {}", args.config.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running));

    run_feed(&bridge, &running);

    bridge.close();
    tracing::info!("Bridge shutdown complete");

    Ok(())
}

/// Feed `topic payload` lines from stdin through a channel so the loop can
/// observe the stop flag while stdin blocks.
fn run_feed(bridge: &Bridge, running: &AtomicBool) {
    let (tx, rx) = mpsc::channel::<String>();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        // Dropping tx signals EOF to the dispatch loop
    });

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => dispatch_line(bridge, &line),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Split one feed line at the first space and dispatch it.
fn dispatch_line(bridge: &Bridge, line: &str) {
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }

    match line.split_once(' ') {
        Some((topic, payload)) => bridge.dispatch(topic, payload.as_bytes()),
        None => tracing::warn!("Ignoring feed line without a payload: '{}'", line),
    }
}

fn handle_command(cmd: Commands, config_path: &Path) -> Result<()> {
    match cmd {
        Commands::Check { topic } => {
            let table = RoutingTable::load(config_path)
                .with_context(|| format!("Cannot load {}", config_path.display()))?;

            println!("Routing table OK: {} destination(s)", table.len());
            for dest in table.destinations() {
                println!(
                    "  {} -> {} (table {}, log {})",
                    dest.topic,
                    store_path(dest).display(),
                    dest.table_name,
                    dest.log_path.display()
                );
            }

            if let Some(topic) = topic {
                let matched: Vec<_> = table.lookup(&topic).collect();
                println!("Topic '{}' reaches {} destination(s)", topic, matched.len());
                for dest in matched {
                    println!(
                        "  table {} at {}",
                        dest.table_name,
                        store_path(dest).display()
                    );
                }
            }

            Ok(())
        }
    }
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        running.store(false, Ordering::SeqCst);
    });
}
