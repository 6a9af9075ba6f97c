// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store traits for the source and destination instances.
//!
//! The coordinator, scanner and replicator only talk to Redis through
//! [`SourceStore`] and [`DestinationStore`], so tests can drive them with
//! in-memory mocks.
//!
//! # Example
//!
//! ```rust,no_run
//! use redis_replicator::store::{BoxFuture, DestinationStore};
//!
//! struct DiscardingDestination;
//!
//! impl DestinationStore for DiscardingDestination {
//!     fn restore<'a>(&'a self, _key: &'a [u8], _ttl_ms: u64, _value: &'a [u8]) -> BoxFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn delete<'a>(&'a self, _key: &'a [u8]) -> BoxFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn replay<'a>(&'a self, _verb: &'a str, _args: &'a [Vec<u8>]) -> BoxFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use crate::connection;
use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Endpoint label used in errors, logs and metrics.
pub const SOURCE: &str = "source";
/// Endpoint label used in errors, logs and metrics.
pub const DESTINATION: &str = "destination";

/// One SCAN reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next request; `0` ends the iteration.
    pub cursor: u64,
    pub keys: Vec<Vec<u8>>,
}

/// A key's serialized value and remaining TTL, read atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySnapshot {
    /// DUMP payload; `None` when the key does not exist.
    pub value: Option<Vec<u8>>,
    /// PTTL reply: milliseconds, `-1` for no expiry, `-2` for a missing key.
    pub pttl_ms: i64,
}

/// Read side: the instance being copied from.
pub trait SourceStore: Send + Sync + 'static {
    /// One SCAN step from `cursor`.
    fn scan<'a>(&'a self, cursor: u64, count: usize, pattern: Option<&'a str>) -> BoxFuture<'a, ScanPage>;

    /// DUMP and PTTL of a key inside one MULTI/EXEC.
    fn snapshot<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, KeySnapshot>;
}

/// Write side: the instance being copied to.
pub trait DestinationStore: Send + Sync + 'static {
    /// `RESTORE key ttl value REPLACE`. A TTL of `0` means no expiry.
    fn restore<'a>(&'a self, key: &'a [u8], ttl_ms: u64, value: &'a [u8]) -> BoxFuture<'a, ()>;

    /// `DEL key`.
    fn delete<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, ()>;

    /// Apply a command verbatim.
    fn replay<'a>(&'a self, verb: &'a str, args: &'a [Vec<u8>]) -> BoxFuture<'a, ()>;
}

impl<T: SourceStore> SourceStore for Arc<T> {
    fn scan<'a>(&'a self, cursor: u64, count: usize, pattern: Option<&'a str>) -> BoxFuture<'a, ScanPage> {
        (**self).scan(cursor, count, pattern)
    }

    fn snapshot<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, KeySnapshot> {
        (**self).snapshot(key)
    }
}

impl<T: DestinationStore> DestinationStore for Arc<T> {
    fn restore<'a>(&'a self, key: &'a [u8], ttl_ms: u64, value: &'a [u8]) -> BoxFuture<'a, ()> {
        (**self).restore(key, ttl_ms, value)
    }

    fn delete<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, ()> {
        (**self).delete(key)
    }

    fn replay<'a>(&'a self, verb: &'a str, args: &'a [Vec<u8>]) -> BoxFuture<'a, ()> {
        (**self).replay(verb, args)
    }
}

// =============================================================================
// Redis implementations
// =============================================================================

/// Source instance over a multiplexed connection.
///
/// `ConnectionManager` is Clone and multiplexed, so every call clones it
/// instead of holding a lock.
#[derive(Clone)]
pub struct RedisSource {
    conn: ConnectionManager,
}

impl RedisSource {
    /// Connect with retry.
    pub async fn connect(url: &str, retry: &RetryConfig) -> Result<Self> {
        let client = connection::open_client(SOURCE, url)?;
        let conn = connection::connect_with_retry(SOURCE, &client, retry).await?;
        Ok(Self { conn })
    }
}

impl SourceStore for RedisSource {
    fn scan<'a>(&'a self, cursor: u64, count: usize, pattern: Option<&'a str>) -> BoxFuture<'a, ScanPage> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor);
            if let Some(pattern) = pattern {
                cmd.arg("MATCH").arg(pattern);
            }
            cmd.arg("COUNT").arg(count);

            let (next, keys): (u64, Vec<Vec<u8>>) = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| ReplicationError::command(SOURCE, "SCAN", &[cursor.to_string().into_bytes()], e))?;

            Ok(ScanPage { cursor: next, keys })
        })
    }

    fn snapshot<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, KeySnapshot> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let result: redis::RedisResult<(Option<Vec<u8>>, i64)> = redis::pipe()
                .atomic()
                .cmd("DUMP")
                .arg(key)
                .cmd("PTTL")
                .arg(key)
                .query_async(&mut conn)
                .await;

            match result {
                Ok((value, pttl_ms)) => Ok(KeySnapshot { value, pttl_ms }),
                Err(e) if e.kind() == redis::ErrorKind::TypeError => Err(ReplicationError::Serialization {
                    key: String::from_utf8_lossy(key).into_owned(),
                    message: format!("unexpected DUMP/PTTL reply: {}", e),
                }),
                Err(e) => Err(ReplicationError::command(SOURCE, "DUMP", &[key.to_vec()], e)),
            }
        })
    }
}

/// Destination instance over a multiplexed connection.
#[derive(Clone)]
pub struct RedisDestination {
    conn: ConnectionManager,
}

impl RedisDestination {
    /// Connect with retry.
    pub async fn connect(url: &str, retry: &RetryConfig) -> Result<Self> {
        let client = connection::open_client(DESTINATION, url)?;
        let conn = connection::connect_with_retry(DESTINATION, &client, retry).await?;
        Ok(Self { conn })
    }
}

impl DestinationStore for RedisDestination {
    fn restore<'a>(&'a self, key: &'a [u8], ttl_ms: u64, value: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: () = redis::cmd("RESTORE")
                .arg(key)
                .arg(ttl_ms)
                .arg(value)
                .arg("REPLACE")
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    ReplicationError::command(DESTINATION, "RESTORE", &[key.to_vec(), ttl_ms.to_string().into_bytes()], e)
                })?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| ReplicationError::command(DESTINATION, "DEL", &[key.to_vec()], e))?;
            Ok(())
        })
    }

    fn replay<'a>(&'a self, verb: &'a str, args: &'a [Vec<u8>]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let mut cmd = redis::cmd(verb);
            for arg in args {
                cmd.arg(arg.as_slice());
            }
            // Replies vary by verb and are not inspected
            let _: redis::Value = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| ReplicationError::command(DESTINATION, verb, args, e))?;
            Ok(())
        })
    }
}
