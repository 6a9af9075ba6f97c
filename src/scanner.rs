// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk keyspace copy.
//!
//! Walks the source keyspace with SCAN and copies every returned key, one at
//! a time, until the cursor comes back to `0`:
//!
//! ```text
//! cursor = 0
//! do {
//!     (cursor, keys) = SCAN cursor [MATCH p] COUNT n
//!     for key in keys { copy_key(key) }
//! } while cursor != 0
//! ```
//!
//! At least one SCAN is always issued, so an empty keyspace costs exactly
//! one request. SCAN may return a key more than once; copying is idempotent
//! so duplicates are harmless.
//!
//! Shutdown is checked between keys: the copy in flight completes and the
//! scan returns with `completed = false`.

use crate::config::ScanConfig;
use crate::error::Result;
use crate::metrics;
use crate::replicator::{CopyOutcome, KeyReplicator, Origin};
use crate::resilience::ScanThrottle;
use crate::store::{DestinationStore, SourceStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};

/// Cursor value that starts and ends a SCAN iteration.
pub const SCAN_START_CURSOR: u64 = 0;

/// Totals for one bulk scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// SCAN requests issued.
    pub batches: u64,
    pub keys_copied: u64,
    /// Keys listed by SCAN that were gone by the time they were read.
    pub keys_vanished: u64,
    /// `false` when the scan stopped early on shutdown.
    pub completed: bool,
}

/// Drives one full SCAN pass over the source.
pub struct BulkScanner<Src, Dst> {
    source: Arc<Src>,
    replicator: KeyReplicator<Src, Dst>,
    config: ScanConfig,
    throttle: Option<ScanThrottle>,
}

impl<Src: SourceStore, Dst: DestinationStore> BulkScanner<Src, Dst> {
    pub fn new(source: Arc<Src>, replicator: KeyReplicator<Src, Dst>, config: ScanConfig) -> Self {
        let throttle = config.key_rate().map(ScanThrottle::new);
        Self {
            source,
            replicator,
            config,
            throttle,
        }
    }

    /// Copy every key in the source keyspace.
    ///
    /// Any error aborts the scan and is returned as-is.
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Result<ScanStats> {
        let span = info_span!("bulk_scan", count = self.config.count);
        self.scan_all(shutdown_rx).instrument(span).await
    }

    async fn scan_all(&self, shutdown_rx: watch::Receiver<bool>) -> Result<ScanStats> {
        let start = Instant::now();
        let pattern = self.config.match_pattern.as_deref();
        let mut stats = ScanStats::default();
        let mut cursor = SCAN_START_CURSOR;

        info!(pattern = ?pattern, rate_limit = ?self.config.rate_limit_per_sec, "Starting bulk scan");

        loop {
            let page = self.source.scan(cursor, self.config.count, pattern).await?;
            stats.batches += 1;
            metrics::record_scan_batch(page.keys.len());
            debug!(cursor, next = page.cursor, keys = page.keys.len(), "SCAN batch");

            for key in &page.keys {
                if *shutdown_rx.borrow() {
                    info!(batches = stats.batches, keys_copied = stats.keys_copied, "Shutdown during bulk scan");
                    return Ok(stats);
                }
                if let Some(ref throttle) = self.throttle {
                    throttle.acquire().await;
                }
                match self.replicator.copy_key(key, Origin::Scan).await? {
                    CopyOutcome::Copied { .. } => stats.keys_copied += 1,
                    CopyOutcome::Vanished => stats.keys_vanished += 1,
                }
            }

            cursor = page.cursor;
            if cursor == SCAN_START_CURSOR {
                break;
            }
            if *shutdown_rx.borrow() {
                info!(batches = stats.batches, keys_copied = stats.keys_copied, "Shutdown during bulk scan");
                return Ok(stats);
            }
        }

        stats.completed = true;
        info!(
            batches = stats.batches,
            keys_copied = stats.keys_copied,
            keys_vanished = stats.keys_vanished,
            duration_ms = start.elapsed().as_millis() as u64,
            "initial sync complete"
        );
        metrics::record_initial_sync_complete(stats.keys_copied, start.elapsed());

        Ok(stats)
    }
}
