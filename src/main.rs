// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! replicate - keep a Redis instance in sync with another
//!
//! Copies the source keyspace into the destination, then follows live
//! changes until interrupted (or exits after the copy with
//! `--replication-strategy none`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use redis_replicator::{LiveErrorPolicy, ReplicationStrategy, Replicator, ReplicatorConfig};

/// replicate - Redis to Redis replication tool
#[derive(Parser, Debug)]
#[command(name = "replicate")]
#[command(author, version, about = "Continuously sync a Redis instance to another")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the source into the destination and keep it in sync
    Replicate(ReplicateArgs),
}

#[derive(Args, Debug)]
struct ReplicateArgs {
    /// Copy data from this Redis URL
    #[arg(short, long, required_unless_present = "config")]
    source: Option<String>,

    /// Send data to this Redis URL
    #[arg(short, long, required_unless_present = "config")]
    destination: Option<String>,

    /// How live changes on the source are observed
    #[arg(long, value_enum)]
    replication_strategy: Option<StrategyArg>,

    /// COUNT hint for each SCAN request [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    scan_count: Option<u64>,

    /// Only copy keys matching this glob pattern
    #[arg(long)]
    scan_match: Option<String>,

    /// Maximum keys copied per second during the bulk scan
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    scan_rate_limit: Option<u32>,

    /// What to do when applying a live change fails
    #[arg(long, value_enum)]
    live_error_policy: Option<LiveErrorPolicyArg>,

    /// JSON config file; flags given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

/// CLI-friendly strategy enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Tap the MONITOR feed
    Monitor,
    /// Subscribe to keyevent notifications
    Notifications,
    /// Bulk copy only, then exit
    None,
}

impl From<StrategyArg> for ReplicationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Monitor => ReplicationStrategy::CommandStreamCapture,
            StrategyArg::Notifications => ReplicationStrategy::NotificationCapture,
            StrategyArg::None => ReplicationStrategy::NoCapture,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LiveErrorPolicyArg {
    /// Stop on the first failed live change
    FailFast,
    /// Log failed live changes and continue
    LogAndSkip,
}

impl From<LiveErrorPolicyArg> for LiveErrorPolicy {
    fn from(arg: LiveErrorPolicyArg) -> Self {
        match arg {
            LiveErrorPolicyArg::FailFast => LiveErrorPolicy::FailFast,
            LiveErrorPolicyArg::LogAndSkip => LiveErrorPolicy::LogAndSkip,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

impl ReplicateArgs {
    /// Build the run config: file (if any), then command-line overrides.
    fn into_config(self) -> anyhow::Result<ReplicatorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str::<ReplicatorConfig>(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => ReplicatorConfig::default(),
        };

        if let Some(source) = self.source {
            config.source_url = source;
        }
        if let Some(destination) = self.destination {
            config.destination_url = destination;
        }
        if let Some(strategy) = self.replication_strategy {
            config.strategy = strategy.into();
        }
        if let Some(count) = self.scan_count {
            config.scan.count = usize::try_from(count).context("scan count out of range")?;
        }
        if self.scan_match.is_some() {
            config.scan.match_pattern = self.scan_match;
        }
        if self.scan_rate_limit.is_some() {
            config.scan.rate_limit_per_sec = self.scan_rate_limit;
        }
        if let Some(policy) = self.live_error_policy {
            config.capture.live_error_policy = policy.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "replicate failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let Commands::Replicate(args) = command;
    let config = args.into_config()?;

    info!(
        source = %config.source_url,
        destination = %config.destination_url,
        strategy = %config.strategy,
        "Starting replicate"
    );

    let replicator = Arc::new(
        Replicator::connect(config)
            .await
            .context("connecting to source and destination")?,
    );

    let mut run_task = {
        let replicator = Arc::clone(&replicator);
        tokio::spawn(async move { replicator.run().await })
    };

    let summary = tokio::select! {
        joined = &mut run_task => joined.context("replication task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping");
            replicator.shutdown();
            run_task.await.context("replication task panicked")??
        }
    };

    info!(
        initially_synced = summary.initially_synced(),
        batches = summary.scan.batches,
        keys_copied = summary.scan.keys_copied,
        keys_vanished = summary.scan.keys_vanished,
        live_applied = summary.live.applied,
        live_skipped = summary.live.skipped,
        "replicate finished"
    );
    Ok(())
}
