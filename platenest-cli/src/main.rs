//! Platenest CLI
//!
//! Submits a nesting job from a JSON file to an in-process engine and
//! streams its updates to the console. The process exits only once the
//! coordinator reports every issued job terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use platenest_core::{JobStatus, UpdateEvent, wire};
use platenest_engine::{EngineConfig, MalformedUpdate, NestEngine};
use platenest_host::{Coordinator, UpdateObserver};

#[derive(Parser)]
#[command(name = "platenest")]
#[command(about = "2D nesting job runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job from a JSON file and stream its updates
    Run {
        /// Path to the job submission payload
        input: PathBuf,
    },
    /// Print a sample job submission payload
    Sample,
}

/// Prints every update to stdout with a colored status tag
struct ConsoleObserver;

impl UpdateObserver for ConsoleObserver {
    fn on_update(&self, event: &UpdateEvent) {
        let status = match event.status {
            JobStatus::Queued => "queued".yellow(),
            JobStatus::Running => "running".blue(),
            JobStatus::Succeeded => "succeeded".green(),
            JobStatus::Failed => "failed".red(),
            JobStatus::TimedOut => "timed_out".red(),
        };
        print!("[{}] {}", event.job_id, status);
        if let Some(solution) = &event.nesting_solution {
            print!(
                " ({} placements, {} sheet(s), cost {})",
                solution.placements_and_location.len(),
                solution.sheet_count,
                solution.total_cost
            );
        }
        if let Some(error) = &event.error {
            print!(" - {error}");
        }
        println!();
    }

    fn on_malformed(&self, error: &MalformedUpdate) {
        eprintln!("{} {error}", "malformed update:".red());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "platenest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { input } => run(input).await,
        Commands::Sample => {
            println!("{SAMPLE_JOB}");
            Ok(())
        }
    }
}

async fn run(input: PathBuf) -> Result<()> {
    let payload = std::fs::read(&input)
        .with_context(|| format!("Failed to read job file {}", input.display()))?;
    let descriptor = wire::decode_descriptor(&payload)
        .with_context(|| format!("Invalid job payload in {}", input.display()))?;

    info!(
        job_id = %descriptor.job_id,
        parts = descriptor.parts.len(),
        sheets = descriptor.sheets.len(),
        timeout_ms = descriptor.timeout_ms,
        "Submitting nesting job"
    );

    let engine = NestEngine::new(EngineConfig::from_env());
    engine.initialize()?;
    let coordinator = Coordinator::new(Arc::new(engine));

    let handle = coordinator
        .run_job(descriptor, Arc::new(ConsoleObserver))
        .await?;
    let terminal = handle.await_terminal().await?;

    // The coordinator, not a timer, decides when exiting is safe.
    coordinator.wait_all().await?;

    if terminal.status == JobStatus::Succeeded {
        Ok(())
    } else {
        anyhow::bail!(
            "job {} ended {:?}: {}",
            terminal.job_id,
            terminal.status,
            terminal.error.as_deref().unwrap_or("no detail")
        )
    }
}

const SAMPLE_JOB: &str = r#"{
  "nesting_job_ulid": "01EYQZJZJZJZJZJZJZJZJZJZJZ",
  "tool_diameter": 1.0,
  "timeout": 60000,
  "parts": [
    {
      "quantity": 5,
      "contour": [
        { "x": 0.0, "y": 0.0 },
        { "x": 1.0, "y": 0.0 },
        { "x": 1.0, "y": 1.0 }
      ],
      "rotations": [0, 180]
    }
  ],
  "sheets": [
    { "length": 10.0, "width": 20.0, "cost": 5.0 },
    { "length": 15.0, "width": 25.0, "cost": 8.0 },
    { "length": 30.0, "width": 40.0, "cost": 12.0 }
  ]
}"#;
