// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication coordinator.
//!
//! The orchestrator that ties together:
//! - Live capture via [`crate::capture::ChangeCapture`]
//! - The live consumer (see `live.rs`)
//! - The bulk copy via [`crate::scanner::BulkScanner`]
//!
//! # Ordering
//!
//! Capture is started, and its subscription acknowledged, before the first
//! SCAN is issued. Every mutation that happens during the scan is therefore
//! either seen by the scan or delivered by the feed, and the destination
//! converges once the scan completes and the live backlog drains.
//!
//! # Lifecycle
//!
//! ```text
//! run():
//!   1. start capture, spawn live consumer      (unless strategy is none)
//!   2. SCAN pass                               (live events applied concurrently)
//!   3. "initial sync complete"
//!   4. strategy none → Stopped
//!      otherwise     → SteadyState until shutdown()
//! ```
//!
//! A replicator performs exactly one run; calling `run()` again returns
//! [`ReplicationError::InvalidState`].

mod live;
mod types;

pub use types::{LiveStats, ReplicatorState, RunSummary};

use crate::capture::{self, CaptureTask, ChangeCapture};
use crate::classifier::Classifier;
use crate::config::{ReplicationStrategy, ReplicatorConfig};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::replicator::KeyReplicator;
use crate::resilience::RetryConfig;
use crate::scanner::BulkScanner;
use crate::store::{DestinationStore, RedisDestination, RedisSource, SourceStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Capture feed plus the consumer draining it.
///
/// Dropping this aborts both tasks.
struct LiveTasks {
    capture: CaptureTask,
    consumer: JoinHandle<Result<LiveStats>>,
    /// Set when the consumer already returned during the scan.
    finished: Option<LiveStats>,
}

impl Drop for LiveTasks {
    fn drop(&mut self) {
        self.capture.abort();
        self.consumer.abort();
    }
}

fn consumer_outcome(joined: std::result::Result<Result<LiveStats>, JoinError>) -> Result<LiveStats> {
    joined.map_err(|e| ReplicationError::Internal(format!("live consumer panicked: {}", e)))?
}

/// Copies one Redis instance into another and keeps it in sync.
///
/// `Src` and `Dst` default to the Redis-backed stores; tests substitute
/// in-memory implementations through [`with_stores()`](Self::with_stores).
pub struct Replicator<Src: SourceStore = RedisSource, Dst: DestinationStore = RedisDestination> {
    config: ReplicatorConfig,

    source: Arc<Src>,

    destination: Arc<Dst>,

    /// Live capture for the configured strategy
    capture: Box<dyn ChangeCapture>,

    /// Run state (broadcast to watchers)
    state_tx: watch::Sender<ReplicatorState>,

    /// Run state receiver (for internal use)
    state_rx: watch::Receiver<ReplicatorState>,

    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,

    /// Set by the first call to `run()`
    started: AtomicBool,
}

impl Replicator<RedisSource, RedisDestination> {
    /// Validate the config, connect to both instances and build the capture
    /// for the configured strategy.
    ///
    /// The replicator starts in `Idle`. Call [`run()`](Self::run) to begin.
    pub async fn connect(config: ReplicatorConfig) -> Result<Self> {
        config.validate()?;
        let classifier = Arc::new(Classifier::new(config.commands.clone())?);

        let retry = RetryConfig::startup();
        let source = RedisSource::connect(&config.source_url, &retry).await?;
        let destination = RedisDestination::connect(&config.destination_url, &retry).await?;
        let capture = capture::for_config(&config, classifier)?;

        Ok(Self::with_stores(config, Arc::new(source), Arc::new(destination), capture))
    }
}

impl<Src: SourceStore, Dst: DestinationStore> Replicator<Src, Dst> {
    /// Create a replicator over explicit stores and capture.
    ///
    /// The strategy is the one reported by `capture`.
    pub fn with_stores(
        config: ReplicatorConfig,
        source: Arc<Src>,
        destination: Arc<Dst>,
        capture: Box<dyn ChangeCapture>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ReplicatorState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            source,
            destination,
            capture,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            started: AtomicBool::new(false),
        }
    }

    /// Get current state.
    pub fn state(&self) -> ReplicatorState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ReplicatorState> {
        self.state_rx.clone()
    }

    /// The live capture strategy.
    pub fn strategy(&self) -> ReplicationStrategy {
        self.capture.strategy()
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Ask the run to stop.
    ///
    /// The scanner and live consumer finish their in-flight operation, then
    /// `run()` returns. Safe to call from another task, and more than once.
    pub fn shutdown(&self) {
        if !*self.shutdown_rx.borrow() {
            info!(state = %self.state(), "Shutdown requested");
        }
        self.shutdown_tx.send_replace(true);
    }

    fn set_state(&self, state: ReplicatorState) {
        debug!(state = %state, "State transition");
        self.state_tx.send_replace(state);
        metrics::set_replicator_state(state.metric_label());
    }

    /// Perform the run: capture, bulk copy, then live sync until shutdown.
    ///
    /// Returns once the run is `Stopped`, or with the fatal error that put
    /// it into `Failed`.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.started.swap(true, Ordering::AcqRel) || self.state() != ReplicatorState::Idle {
            return Err(ReplicationError::InvalidState {
                expected: ReplicatorState::Idle.to_string(),
                actual: self.state().to_string(),
            });
        }

        let strategy = self.strategy();
        info!(
            strategy = %strategy,
            scan_count = self.config.scan.count,
            "Starting replication run"
        );

        match self.drive(strategy).await {
            Ok(summary) => {
                self.set_state(ReplicatorState::Stopped);
                info!(
                    initially_synced = summary.initially_synced(),
                    keys_copied = summary.scan.keys_copied,
                    live_applied = summary.live.applied,
                    live_skipped = summary.live.skipped,
                    "Replication run stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                self.set_state(ReplicatorState::Failed);
                metrics::record_error(error_label(&e));
                error!(error = %e, "Replication run failed");
                Err(e)
            }
        }
    }

    async fn drive(&self, strategy: ReplicationStrategy) -> Result<RunSummary> {
        let replicator = KeyReplicator::new(Arc::clone(&self.source), Arc::clone(&self.destination));

        let mut live = if strategy.is_continuous() {
            let (tx, rx) = mpsc::channel(self.config.capture.channel_capacity);
            let capture = self.capture.start(tx).await?;
            self.set_state(ReplicatorState::CaptureStarted);

            let consumer = tokio::spawn(live::run_consumer(
                rx,
                replicator.clone(),
                self.config.capture.live_error_policy,
                self.shutdown_rx.clone(),
            ));
            Some(LiveTasks {
                capture,
                consumer,
                finished: None,
            })
        } else {
            None
        };

        self.set_state(ReplicatorState::BulkSyncing);
        let scanner = BulkScanner::new(Arc::clone(&self.source), replicator, self.config.scan.clone());
        let scan = scanner.run(self.shutdown_rx.clone());
        tokio::pin!(scan);

        // A live failure during the scan ends the run without waiting for it
        let scan_stats = match live.as_mut() {
            None => scan.await?,
            Some(tasks) => tokio::select! {
                result = &mut scan => result?,
                joined = &mut tasks.consumer => {
                    tasks.finished = Some(consumer_outcome(joined)?);
                    scan.await?
                }
            },
        };

        let mut summary = RunSummary {
            scan: scan_stats,
            live: LiveStats::default(),
        };

        let tasks = match live {
            Some(tasks) => tasks,
            None => return Ok(summary),
        };

        if summary.scan.completed {
            self.set_state(ReplicatorState::SteadyState);
            info!("Initially synced, applying live changes until shutdown");
        }

        summary.live = self.finish_live(tasks).await?;
        Ok(summary)
    }

    /// Wait for shutdown, then give the consumer the drain timeout to finish.
    async fn finish_live(&self, mut tasks: LiveTasks) -> Result<LiveStats> {
        if let Some(stats) = tasks.finished.take() {
            return Ok(stats);
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            joined = &mut tasks.consumer => return consumer_outcome(joined),
            _ = shutdown_signalled(&mut shutdown_rx) => {}
        }

        let drain_timeout = self.config.drain_timeout_duration();
        match tokio::time::timeout(drain_timeout, &mut tasks.consumer).await {
            Ok(joined) => consumer_outcome(joined),
            Err(_) => {
                warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "Live consumer did not drain in time, aborting"
                );
                Ok(LiveStats::default())
            }
        }
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    // Sender lives in the replicator; an error means it is gone, which is a stop too
    let _ = rx.wait_for(|stop| *stop).await;
}

fn error_label(e: &ReplicationError) -> &'static str {
    match e {
        ReplicationError::Connection { .. } => "connection",
        ReplicationError::Command { .. } => "command",
        ReplicationError::Serialization { .. } => "serialization",
        ReplicationError::CaptureParse(_) => "capture_parse",
        ReplicationError::Config(_) => "config",
        ReplicationError::InvalidState { .. } => "invalid_state",
        ReplicationError::Shutdown => "shutdown",
        ReplicationError::Internal(_) => "internal",
    }
}
