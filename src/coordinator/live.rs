//! Live path: drains the capture channel into the destination.
//!
//! A single consumer task applies actions strictly in arrival order, one at
//! a time, from the moment capture starts until shutdown. It runs
//! concurrently with the bulk scan; the two may write the same key in
//! either order.
//!
//! # Graceful Shutdown
//!
//! Shutdown is checked between actions, so the action in flight completes
//! before the consumer returns. The coordinator bounds the wait with the
//! configured drain timeout.
//!
//! # Failure Policy
//!
//! | Policy | Skippable error | Other error |
//! |--------|-----------------|-------------|
//! | `FailFast` | abort run | abort run |
//! | `LogAndSkip` | warn, count, continue | abort run |
//!
//! A closed channel means the capture feed ended, which is fatal.

use super::types::LiveStats;
use crate::classifier::ReplicationAction;
use crate::config::LiveErrorPolicy;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::replicator::KeyReplicator;
use crate::store::{DestinationStore, SourceStore, SOURCE};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Run the live consumer until shutdown or a fatal error.
pub async fn run_consumer<Src: SourceStore, Dst: DestinationStore>(
    mut events: mpsc::Receiver<ReplicationAction>,
    replicator: KeyReplicator<Src, Dst>,
    policy: LiveErrorPolicy,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<LiveStats> {
    let span = info_span!("live", policy = ?policy);

    async move {
        info!("Starting live consumer");
        let mut stats = LiveStats::default();

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!(applied = stats.applied, skipped = stats.skipped, "Live consumer stopped");
                return Ok(stats);
            }

            let action = tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        // Coordinator gone
                        return Ok(stats);
                    }
                    continue;
                }

                next = events.recv() => match next {
                    Some(action) => action,
                    None => {
                        error!(received = stats.received, "Capture feed closed");
                        return Err(ReplicationError::connection(SOURCE, "capture feed closed"));
                    }
                },
            };

            stats.received += 1;
            metrics::set_capture_backlog(events.len());

            let start = Instant::now();
            match replicator.apply(&action).await {
                Ok(()) => {
                    stats.applied += 1;
                    metrics::record_action_applied(action.label(), start.elapsed());
                    debug!(kind = action.label(), "Applied live action");
                }
                Err(e) if policy == LiveErrorPolicy::LogAndSkip && e.is_skippable() => {
                    stats.skipped += 1;
                    metrics::record_live_error_skipped(action.label());
                    warn!(
                        kind = action.label(),
                        key = %action.key().map(String::from_utf8_lossy).unwrap_or_default(),
                        error = %e,
                        "Skipping failed live action"
                    );
                }
                Err(e) => {
                    error!(kind = action.label(), error = %e, "Live action failed");
                    return Err(e);
                }
            }
        }
    }
    .instrument(span)
    .await
}
