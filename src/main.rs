//! GG-BATCH command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `gg-batch-cli demo [REQUESTS] [BATCH_DELAY_MS]` - Drive synthetic load through the queue
//! - `gg-batch-cli config show [--json]` - Print effective configuration
//! - `gg-batch-cli config defaults` - Print default configuration
//! - `gg-batch-cli version` - Print version

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gg_batch::config::{self as gg_config, EffectiveConfig};
use gg_batch::scheduler::{BackendError, ComputeBackend, RequestError};
use gg_batch::telemetry::{init_logging, LogConfig, LogFormat};
use gg_batch::{Runtime, RuntimeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "demo" => {
            init_cli_logging();
            let requests = parse_arg(&args, 2, 200);
            let delay_ms = parse_arg(&args, 3, 20);
            run_demo(gg_config::load(), requests, delay_ms).await
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json = args.get(3).map(|s| s.as_str()) == Some("--json");
                    print_config(&gg_config::load().effective_config(), json)
                }
                "defaults" => print_config(&EffectiveConfig::default(), false),
                other => {
                    eprintln!("Unknown config subcommand: {}", other);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("GG-BATCH {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("GG-BATCH - dynamic request batching core");
    println!();
    println!("USAGE:");
    println!("    gg-batch-cli <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    demo [REQUESTS] [BATCH_DELAY_MS]   Drive synthetic load through the queue");
    println!("    config show [--json]               Print effective configuration");
    println!("    config defaults                    Print default configuration");
    println!("    version                            Print version");
    println!("    help                               Print this message");
}

fn parse_arg(args: &[String], index: usize, default: u64) -> u64 {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn init_cli_logging() {
    let base = LogConfig { format: LogFormat::Pretty, ..LogConfig::default() };
    let result = base.with_env_overrides().and_then(|config| init_logging(&config));
    if let Err(e) = result {
        eprintln!("Logging disabled: {}", e);
    }
}

fn print_config(config: &EffectiveConfig, json: bool) -> ExitCode {
    if json {
        return match serde_json::to_string_pretty(config) {
            Ok(s) => {
                println!("{}", s);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize config: {}", e);
                ExitCode::FAILURE
            }
        };
    }
    println!("batch_size            = {}", config.batch_size);
    println!("max_batches_per_pull  = {}", config.max_batches_per_pull);
    println!("poll_timeout_ms       = {}", config.poll_timeout_ms);
    println!("queue_timeout_ms      = {}", config.queue_timeout_ms);
    println!("max_queue_size        = {}", config.max_queue_size);
    println!("cache_enabled         = {}", config.cache_enabled);
    println!("cache_ttl_secs        = {}", config.cache_ttl_secs);
    println!("cache_max_entries     = {}", config.cache_max_entries);
    println!("shutdown_timeout_secs = {}", config.shutdown_timeout_secs);
    ExitCode::SUCCESS
}

/// Stand-in backend: sleeps per batch and returns each input's length.
struct SyntheticBackend {
    delay: Duration,
}

#[async_trait]
impl ComputeBackend<String, Vec<f32>> for SyntheticBackend {
    async fn execute(&self, batch: &[Arc<String>]) -> Result<Vec<Vec<f32>>, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(batch.iter().map(|s| vec![s.len() as f32]).collect())
    }
}

async fn run_demo(config: RuntimeConfig, requests: u64, delay_ms: u64) -> ExitCode {
    let backend: Arc<dyn ComputeBackend<String, Vec<f32>>> =
        Arc::new(SyntheticBackend { delay: Duration::from_millis(delay_ms) });
    let runtime = match Runtime::start(config, backend) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let tasks: Vec<_> = (0..requests)
        .map(|i| {
            let handler = Arc::clone(runtime.handler());
            tokio::spawn(async move {
                handler.infer(format!("This is test sentence number {}", i)).await
            })
        })
        .collect();

    let results = tokio::select! {
        results = futures::future::join_all(tasks) => results,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            runtime.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    let (mut ok, mut timeouts, mut other) = (0u64, 0u64, 0u64);
    for result in results {
        match result {
            Ok(Ok(_)) => ok += 1,
            Ok(Err(e)) if e.is_timeout() => timeouts += 1,
            Ok(Err(RequestError::Rejected(e))) => {
                eprintln!("Rejected: {}", e);
                other += 1;
            }
            _ => other += 1,
        }
    }

    println!("Completed {} requests in {:.2?}", requests, start.elapsed());
    println!("  succeeded: {}", ok);
    println!("  timed out: {}", timeouts);
    println!("  other:     {}", other);

    match runtime.shutdown().await {
        gg_batch::shutdown::ShutdownResult::Complete => ExitCode::SUCCESS,
        gg_batch::shutdown::ShutdownResult::Timeout { remaining } => {
            eprintln!("Shutdown timed out with {} units in flight", remaining);
            ExitCode::FAILURE
        }
    }
}
