// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Live change capture.
//!
//! A [`ChangeCapture`] observes mutations on the source and sends one
//! [`ReplicationAction`] per affected key (or replayable command) into a
//! bounded channel drained by the live consumer.
//!
//! | Strategy | Feed | Translation |
//! |----------|------|-------------|
//! | `monitor` | MONITOR on a dedicated connection | classifier: replay, copy, or ignore |
//! | `notifications` | PSUBSCRIBE `__keyevent@<db>__:*` | `del` → delete, known verb → copy |
//! | `none` | nothing | empty sequence |
//!
//! # Lifecycle
//!
//! [`ChangeCapture::start()`] resolves only once the source has acknowledged
//! the MONITOR or PSUBSCRIBE, so every mutation that happens after it
//! returns will be observed. The returned task owns the feed; it ends with
//! a [`ReplicationError::Connection`](crate::ReplicationError) when the feed
//! terminates, or `Ok(())` once the consumer side of the channel is gone.

pub mod monitor;
pub mod notifications;

pub use monitor::{parse_monitor_line, CommandStreamCapture, RawCommand};
pub use notifications::{parse_keyevent_channel, NotificationCapture};

use crate::classifier::{Classifier, ReplicationAction};
use crate::config::{ReplicationStrategy, ReplicatorConfig};
use crate::error::Result;
use crate::store::BoxFuture;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to a running capture feed.
pub type CaptureTask = JoinHandle<Result<()>>;

/// Source of live replication actions.
pub trait ChangeCapture: Send + Sync + 'static {
    /// The strategy this capture implements.
    fn strategy(&self) -> ReplicationStrategy;

    /// Subscribe to the source and start forwarding actions into `events`.
    fn start(&self, events: mpsc::Sender<ReplicationAction>) -> BoxFuture<'_, CaptureTask>;
}

/// Capture that observes nothing.
///
/// The sender is dropped immediately, so the receiving side sees an empty,
/// already-closed sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl ChangeCapture for NoCapture {
    fn strategy(&self) -> ReplicationStrategy {
        ReplicationStrategy::NoCapture
    }

    fn start(&self, events: mpsc::Sender<ReplicationAction>) -> BoxFuture<'_, CaptureTask> {
        drop(events);
        Box::pin(async move { Ok(tokio::spawn(async { Ok(()) })) })
    }
}

/// Build the capture implementation for the configured strategy.
pub fn for_config(config: &ReplicatorConfig, classifier: Arc<Classifier>) -> Result<Box<dyn ChangeCapture>> {
    let db = config.source_db()?;
    Ok(match config.strategy {
        ReplicationStrategy::CommandStreamCapture => {
            Box::new(CommandStreamCapture::new(&config.source_url, db, classifier))
        }
        ReplicationStrategy::NotificationCapture => Box::new(NotificationCapture::new(
            &config.source_url,
            db,
            config.capture.clone(),
            classifier,
        )),
        ReplicationStrategy::NoCapture => Box::new(NoCapture),
    })
}
