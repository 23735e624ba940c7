use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use quantum_rate::config::{AppConfig, LoggingConfig};
use quantum_rate::{Delay, QuantumLimiter};

/// Drive a per-task time quantum limiter with concurrent callers.
#[derive(Parser, Debug)]
#[command(name = "quantum-rate")]
#[command(version, about = "Drive a per-task time quantum limiter with concurrent callers")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured quantum, in milliseconds
    #[arg(long)]
    quantum_ms: Option<u64>,

    /// Slice each call asks for, in milliseconds
    #[arg(long, default_value_t = 1000)]
    slice_ms: u64,

    /// Number of distinct task names callers pick from
    #[arg(short, long, default_value_t = 7)]
    tasks: u32,

    /// Number of concurrent callers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 10)]
    duration_secs: u64,

    /// Log as JSON and print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Counters shared by all callers.
#[derive(Debug, Default)]
struct Stats {
    granted: AtomicU64,
    denied: AtomicU64,
}

/// Outcome of a run.
#[derive(Debug, Serialize)]
struct RunSummary {
    quantum_ms: u64,
    slice_ms: u64,
    tasks: u32,
    workers: usize,
    elapsed_ms: u128,
    granted: u64,
    denied: u64,
    tracked_tasks: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(quantum_ms) = args.quantum_ms {
        config.limiter.quantum_ms = quantum_ms;
    }
    if args.json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting quantum-rate load driver");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if args.tasks == 0 {
        anyhow::bail!("--tasks must be at least 1");
    }

    let limiter = Arc::new(QuantumLimiter::with_config(config.limiter.clone())?);
    info!(
        quantum = ?limiter.quantum(),
        tick_interval = ?config.limiter.tick_interval(),
        sweep_batch = config.limiter.sweep_batch,
        "Configuration loaded"
    );

    let slice = Duration::from_millis(args.slice_ms);
    let stats = Arc::new(Stats::default());
    let (stop, stopped) = watch::channel(false);

    let workers: Vec<_> = (0..args.workers)
        .map(|id| {
            tokio::spawn(drive(
                id,
                limiter.clone(),
                args.tasks,
                slice,
                stopped.clone(),
                stats.clone(),
            ))
        })
        .collect();

    let started = Instant::now();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {
            info!("Run duration elapsed");
        }
        _ = shutdown_signal() => {}
    }

    stop.send_replace(true);
    for result in join_all(workers).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Caller stopped early"),
            Err(e) => warn!(error = %e, "Caller panicked"),
        }
    }

    let tracked_tasks = limiter.tracked_tasks().await.unwrap_or_default();
    limiter.close().await?;

    let summary = RunSummary {
        quantum_ms: config.limiter.quantum_ms,
        slice_ms: args.slice_ms,
        tasks: args.tasks,
        workers: args.workers,
        elapsed_ms: started.elapsed().as_millis(),
        granted: stats.granted.load(Ordering::Relaxed),
        denied: stats.denied.load(Ordering::Relaxed),
        tracked_tasks,
    };

    info!(
        granted = summary.granted,
        denied = summary.denied,
        tracked_tasks = summary.tracked_tasks,
        elapsed_ms = summary.elapsed_ms as u64,
        "Run complete"
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    info!("quantum-rate load driver stopped");
    Ok(())
}

/// One caller: pick a random task, schedule it, wait out denials.
async fn drive(
    id: usize,
    limiter: Arc<QuantumLimiter>,
    tasks: u32,
    slice: Duration,
    mut stop: watch::Receiver<bool>,
    stats: Arc<Stats>,
) -> quantum_rate::Result<()> {
    while !*stop.borrow() {
        let task = format!("task-{}", rand::thread_rng().gen_range(0..tasks));

        match limiter.schedule(&task, slice).await? {
            Delay::Ready(spare) => {
                stats.granted.fetch_add(1, Ordering::Relaxed);
                debug!(caller = id, task = %task, spare = ?spare, "Granted");
                tokio::task::yield_now().await;
            }
            Delay::Wait(wait) => {
                stats.denied.fetch_add(1, Ordering::Relaxed);
                debug!(caller = id, task = %task, wait = ?wait, "Denied, waiting");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop.changed() => break,
                }
            }
        }
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
