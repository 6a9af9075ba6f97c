// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Single-key copy and live action dispatch.
//!
//! Copying a key reads its serialized value and remaining TTL from the
//! source in one transaction, then overwrites the destination with
//! `RESTORE ... REPLACE`. The copy is idempotent: repeating it with an
//! unchanged source leaves the destination unchanged.
//!
//! # TTL Normalization
//!
//! | PTTL reply | Meaning | Destination effect |
//! |------------|---------|--------------------|
//! | `n > 0` | expires in `n` ms | restore with TTL `n` |
//! | `0` | expiring now | delete |
//! | `-1` (any other negative) | no expiry | restore with TTL `0` |
//! | `-2` | key vanished since it was observed | delete |

use crate::classifier::ReplicationAction;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::{DestinationStore, SourceStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// PTTL reply for a key that does not exist.
pub const PTTL_KEY_MISSING: i64 = -2;

/// Where a copy request came from, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Scan,
    Live,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Scan => "scan",
            Origin::Live => "live",
        }
    }
}

/// Result of copying one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Value restored at the destination.
    Copied { ttl_ms: u64 },
    /// Key was gone or expiring at the source; deleted at the destination.
    Vanished,
}

/// Map a PTTL reply to a RESTORE TTL. `None` means the key is gone.
///
/// RESTORE reads TTL `0` as "no expiry", so a key with no time left is
/// treated as gone rather than restored as persistent.
pub fn normalize_ttl(pttl_ms: i64) -> Option<u64> {
    match pttl_ms {
        PTTL_KEY_MISSING | 0 => None,
        ms if ms > 0 => Some(ms as u64),
        _ => Some(0),
    }
}

/// Copies keys from a source to a destination.
pub struct KeyReplicator<Src, Dst> {
    source: Arc<Src>,
    destination: Arc<Dst>,
}

impl<Src, Dst> Clone for KeyReplicator<Src, Dst> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
        }
    }
}

impl<Src: SourceStore, Dst: DestinationStore> KeyReplicator<Src, Dst> {
    pub fn new(source: Arc<Src>, destination: Arc<Dst>) -> Self {
        Self { source, destination }
    }

    /// Copy one key's value and TTL.
    pub async fn copy_key(&self, key: &[u8], origin: Origin) -> Result<CopyOutcome> {
        let start = Instant::now();
        let snapshot = self.source.snapshot(key).await?;

        let ttl_ms = match normalize_ttl(snapshot.pttl_ms) {
            Some(ttl) => ttl,
            None => {
                debug!(key = %String::from_utf8_lossy(key), "Key vanished from source, deleting");
                self.destination.delete(key).await?;
                metrics::record_key_vanished(origin.as_str());
                return Ok(CopyOutcome::Vanished);
            }
        };

        let value = snapshot.value.ok_or_else(|| ReplicationError::Serialization {
            key: String::from_utf8_lossy(key).into_owned(),
            message: format!("DUMP returned nil while PTTL reported {}", snapshot.pttl_ms),
        })?;

        self.destination.restore(key, ttl_ms, &value).await?;
        metrics::record_key_copied(origin.as_str(), value.len(), start.elapsed());

        Ok(CopyOutcome::Copied { ttl_ms })
    }

    /// Apply a live action to the destination.
    pub async fn apply(&self, action: &ReplicationAction) -> Result<()> {
        match action {
            ReplicationAction::Replay { verb, args } => self.destination.replay(verb, args).await,
            ReplicationAction::CopyKey(key) => self.copy_key(key, Origin::Live).await.map(|_| ()),
            ReplicationAction::Delete(key) => self.destination.delete(key).await,
            ReplicationAction::Ignore => Ok(()),
        }
    }
}
