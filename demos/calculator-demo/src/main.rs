//! # Calculator Demo
//!
//! Drives the calculator adapter end to end:
//! 1. Allocate a handle per operation and run a blocking call
//! 2. Optionally submit a slow callback request and cancel it mid-flight
//! 3. Shut down and report what was still running
//!
//! ## Usage
//! ```bash
//! cargo run -p calculator-demo -- --operands 1,2,3,4 --step-delay-ms 100
//! RUST_LOG=debug cargo run -p calculator-demo -- --cancel-demo
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use turul_calc_adapter::prelude::*;

#[derive(Parser)]
#[command(name = "calculator-demo")]
#[command(about = "Cancellable SUM/PRODUCT calculator demonstration")]
struct Args {
    /// TOML file with adapter settings (operation_timeout, [engine])
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated operands
    #[arg(
        long,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = vec![1, 2, 3, 4, 5]
    )]
    operands: Vec<i32>,

    /// Simulated processing time per fold step (overrides the config file)
    #[arg(long)]
    step_delay_ms: Option<u64>,

    /// Blocking call timeout (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Also submit a slow request through the callback path and cancel it
    #[arg(long)]
    cancel_demo: bool,
}

fn load_config(args: &Args) -> Result<AdapterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        }
        None => AdapterConfig::default(),
    };
    if let Some(ms) = args.step_delay_ms {
        config = config.with_step_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_operation_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

async fn run_cancel_demo(manager: &ConnectionManager, operands: &[i32]) -> Result<()> {
    let handle = manager.allocate(Operation::Sum)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let err_tx = tx.clone();
    let callback = callback_fn(
        move |outcome| {
            let _ = tx.send(Ok(outcome));
        },
        move |error| {
            let _ = err_tx.send(Err(error));
        },
    );

    let task_id = handle.perform_with_callback(operands, callback).await?;
    info!(%task_id, "Submitted request, cancelling shortly");
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel().await;

    match rx.recv().await.context("callback dropped")? {
        Ok(outcome) => info!(%task_id, %outcome, "Callback delivered"),
        Err(error) => warn!(%task_id, %error, "Callback failed"),
    }
    handle.close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        operands = ?args.operands,
        step_delay_ms = config.engine.step_delay.as_millis() as u64,
        timeout_ms = config.operation_timeout.as_millis() as u64,
        "Starting calculator demo"
    );

    let manager = ConnectionManager::new(config);

    for operation in Operation::ALL {
        let handle = manager.allocate(operation)?;
        match handle.perform_while_waiting(&args.operands).await {
            Ok(outcome) => info!(%operation, %outcome, "Blocking call returned"),
            Err(error) => warn!(%operation, %error, "Blocking call failed"),
        }
        handle.close();
    }

    if args.cancel_demo {
        run_cancel_demo(&manager, &args.operands).await?;
    }

    let report = manager.shutdown().await;
    for cancelled in &report.cancelled {
        info!(
            task_id = %cancelled.task_id,
            elapsed_ms = cancelled.elapsed_ms,
            "Cancelled at shutdown"
        );
    }
    info!(cancelled = report.cancelled.len(), "Calculator demo finished");
    Ok(())
}
