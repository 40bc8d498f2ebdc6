//! taskq CLI: feed stdin lines through a dedicated-worker task queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use taskq_rs::config::{Config, ProcessorConfig};
use taskq_rs::engine::TaskQueueProcessor;
use taskq_rs::error::Error;
use taskq_rs::model::WorkItem;
use taskq_rs::sink::TracingSink;
use taskq_rs::telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "taskq", about = "Background task queue with a dedicated worker")]
struct Cli {
    /// Processor config file (TOML, `[processor]` table)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue each stdin line and process it on the worker thread
    Run {
        /// Maximum queued items (overrides config and env)
        #[arg(long)]
        capacity: Option<usize>,
        /// Simulated processing time per item
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// Fail items whose payload contains this substring
        #[arg(long)]
        fail_on: Option<String>,
        /// Discard queued items at EOF instead of draining them
        #[arg(long)]
        no_drain: bool,
    },
    /// Print the effective processor configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Run {
            capacity,
            delay_ms,
            fail_on,
            no_drain,
        } => {
            let mut processor_config = load_processor_config(cli.config.as_deref(), &config)?;
            if let Some(capacity) = capacity {
                processor_config = processor_config.capacity(capacity).validate()?;
            }
            cmd_run(
                &config,
                processor_config,
                Duration::from_millis(delay_ms),
                fail_on,
                !no_drain,
            )
            .await
        }
        Command::Config => {
            let processor_config = load_processor_config(cli.config.as_deref(), &config)?;
            println!("{}", serde_json::to_string_pretty(&processor_config)?);
            Ok(())
        }
    }
}

fn load_processor_config(
    path: Option<&std::path::Path>,
    config: &Config,
) -> anyhow::Result<ProcessorConfig> {
    let base = match path {
        Some(path) => ProcessorConfig::from_file(path)?,
        None => ProcessorConfig::default(),
    };
    Ok(config.apply_to(base))
}

async fn cmd_run(
    config: &Config,
    processor_config: ProcessorConfig,
    delay: Duration,
    fail_on: Option<String>,
    drain: bool,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::for_processor(
        "taskq",
        config,
        &processor_config,
    ))?;

    // Runs on the worker thread, so sleeping here never blocks the runtime.
    let handler = move |item: &WorkItem<String>| -> anyhow::Result<()> {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(ref needle) = fail_on {
            if item.payload().contains(needle.as_str()) {
                anyhow::bail!("payload contains {needle:?}");
            }
        }
        println!("{}\t{}", item.seq(), item.payload());
        Ok(())
    };

    let processor = Arc::new(TaskQueueProcessor::with_config(
        processor_config,
        handler,
        TracingSink,
    )?);
    processor.start_processing()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break false;
                };
                if line.trim().is_empty() {
                    continue;
                }
                enqueue_with_backoff(&processor, line).await?;
            }
            _ = &mut ctrl_c => {
                warn!("interrupted, discarding queued items");
                break true;
            }
        }
    };

    let drain = drain && !interrupted;
    info!(drain, queued = processor.len(), "input finished, shutting down");

    // shutdown blocks until the worker exits; keep it off the async workers.
    let p = Arc::clone(&processor);
    tokio::task::spawn_blocking(move || p.shutdown(drain)).await??;

    eprintln!("{}", serde_json::to_string_pretty(&processor.stats())?);
    Ok(())
}

/// A full bounded queue is back-pressure: yield and retry instead of dropping.
async fn enqueue_with_backoff(
    processor: &TaskQueueProcessor<String>,
    line: String,
) -> anyhow::Result<()> {
    let mut delay = Duration::from_millis(1);
    loop {
        match processor.enqueue(line.clone()) {
            Ok(_) => return Ok(()),
            Err(Error::QueueFull { .. }) => {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(100));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
