//! # Redis Replicator
//!
//! Copies every key of a source Redis instance into a destination instance,
//! then keeps the destination in sync by observing live mutations on the
//! source.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                             Replicator                                   │
//! │                                                                          │
//! │  ┌───────────────┐  actions  ┌───────────────┐                           │
//! │  │ ChangeCapture │──(mpsc)──►│ live consumer │──┐                        │
//! │  │ MONITOR/notif │           └───────────────┘  │   ┌────────────────┐   │
//! │  └───────────────┘                              ├──►│ KeyReplicator  │──►│ destination
//! │         ▲                  ┌───────────────┐    │   │ DUMP+PTTL →    │   │
//! │ source ─┤                  │ BulkScanner   │────┘   │ RESTORE REPLACE│   │
//! │         └──────────────────│ SCAN cursor   │        └────────────────┘   │
//! │                            └───────────────┘                             │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Paths
//!
//! 1. **Bulk copy**: one SCAN pass over the source keyspace, copying each key
//!    with its remaining TTL.
//! 2. **Live capture**: started before the scan so nothing written during the
//!    copy is missed. Replayable commands are re-issued verbatim; everything
//!    else triggers a fresh copy of the affected key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use redis_replicator::{Replicator, ReplicatorConfig, ReplicationStrategy};
//!
//! #[tokio::main]
//! async fn main() -> redis_replicator::Result<()> {
//!     let config = ReplicatorConfig {
//!         strategy: ReplicationStrategy::NoCapture,
//!         ..ReplicatorConfig::for_testing("redis://primary:6379", "redis://standby:6379")
//!     };
//!
//!     let replicator = Replicator::connect(config).await?;
//!     let summary = replicator.run().await?;
//!     println!("copied {} keys", summary.scan.keys_copied);
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod replicator;
pub mod resilience;
pub mod scanner;
pub mod store;

// Re-exports for convenience
pub use capture::{ChangeCapture, CommandStreamCapture, NoCapture, NotificationCapture};
pub use classifier::{ActionKind, Classifier, CommandTable, KeyArgs, ReplicationAction};
pub use config::{CaptureConfig, LiveErrorPolicy, ReplicationStrategy, ReplicatorConfig, ScanConfig};
pub use coordinator::{LiveStats, Replicator, ReplicatorState, RunSummary};
pub use error::{ReplicationError, Result};
pub use replicator::{CopyOutcome, KeyReplicator};
pub use scanner::{BulkScanner, ScanStats};
pub use store::{DestinationStore, KeySnapshot, RedisDestination, RedisSource, ScanPage, SourceStore};
