//! `pipeline-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: build a pipeline from a JSON definition and execute it.
//! - `validate`: check a pipeline definition and print its execution order.

mod logging;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::{build_dag, NodeId, PipelineDefinition, RunOptions};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::logging::{init_logging, LogLevel};

#[derive(Parser)]
#[command(
    name = "pipeline-runner",
    about = "Dependency-ordered task pipeline runner",
    version
)]
struct Cli {
    /// Overrides `PIPELINE_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a pipeline and print its final snapshot as JSON.
    Run {
        /// Path to the pipeline JSON file.
        path: PathBuf,
        /// Attempts per step before it is reported as failed.
        #[arg(long, env = "PIPELINE_MAX_RETRIES", default_value_t = 1)]
        max_retries: u32,
        /// Pause between two attempts, in milliseconds.
        #[arg(long, env = "PIPELINE_RETRY_DELAY_MS", default_value_t = 3000)]
        delay_ms: u64,
    },
    /// Validate a pipeline definition JSON file.
    Validate {
        /// Path to the pipeline JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.command {
        Command::Run {
            path,
            max_retries,
            delay_ms,
        } => {
            let options = RunOptions {
                max_retries,
                delay: Duration::from_millis(delay_ms),
            };
            run(&path, &options).await
        }
        Command::Validate { path } => validate(&path),
    }
}

fn load(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid pipeline JSON in {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let definition = load(path)?;
    let built = build_dag(&definition).context("validation failed")?;
    let order = built.order()?;
    println!("Pipeline \"{}\" is valid. Execution order: {order:?}", definition.name);
    Ok(())
}

async fn run(path: &Path, options: &RunOptions) -> Result<()> {
    let definition = load(path)?;
    let built = build_dag(&definition).context("invalid pipeline")?;

    let names: HashMap<NodeId, String> = built
        .steps
        .iter()
        .map(|(step, &id)| (id, step.clone()))
        .collect();
    let mut updates = built.dag.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    let step = names.get(&update.node_id).map(String::as_str).unwrap_or("?");
                    debug!(step, state = ?update.state.run_state, status = ?update.state.status, "step update");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!(
        pipeline = %definition.name,
        steps = built.steps.len(),
        max_retries = options.max_retries,
        "running pipeline"
    );
    let outcome = built.dag.start(options).await;
    progress.abort();

    let snapshot = built.dag.serialize()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Err(first) = outcome {
        let failures = built.dag.failures();
        for failure in &failures {
            warn!(error = %failure, "step failed");
        }
        return Err(first).with_context(|| {
            format!("pipeline \"{}\" failed ({} failures)", definition.name, failures.len())
        });
    }
    info!(pipeline = %definition.name, "pipeline finished");
    Ok(())
}
