// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Keyspace-notification capture.
//!
//! Subscribes to `__keyevent@<db>__:*`. Each message names the event in the
//! channel and the key in the payload:
//!
//! ```text
//! channel: __keyevent@0__:hset    payload: user:1
//! ```
//!
//! Notifications carry no arguments, so nothing is replayed: `del` deletes
//! the key at the destination and every other recognized event copies it.

use crate::capture::{CaptureTask, ChangeCapture};
use crate::classifier::{Classifier, ReplicationAction};
use crate::config::{CaptureConfig, ReplicationStrategy};
use crate::connection;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::{BoxFuture, SOURCE};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

const STRATEGY: &str = "notifications";

/// Event name carried by a keyevent channel: the text after the first `:`.
///
/// Returns `None` when there is no `:` or nothing follows it.
pub fn parse_keyevent_channel(channel: &str) -> Option<&str> {
    channel.split_once(':').map(|(_, event)| event).filter(|e| !e.is_empty())
}

/// Turn one notification into a destination action.
///
/// `Ok(None)` for events the classifier does not know.
pub fn translate_notification(
    classifier: &Classifier,
    channel: &str,
    key: Vec<u8>,
) -> Result<Option<ReplicationAction>> {
    let event = parse_keyevent_channel(channel)
        .ok_or_else(|| ReplicationError::CaptureParse(format!("not a keyevent channel: {:?}", channel)))?;

    if event.eq_ignore_ascii_case("del") {
        return Ok(Some(ReplicationAction::Delete(key)));
    }
    if classifier.is_recognized_event(event) {
        return Ok(Some(ReplicationAction::CopyKey(key)));
    }

    debug!(event, "Unclassified keyevent, ignoring");
    metrics::record_classification_gap(STRATEGY);
    Ok(None)
}

/// Capture over a pattern subscription to the source's keyevent channels.
pub struct NotificationCapture {
    url: String,
    db: i64,
    config: CaptureConfig,
    classifier: Arc<Classifier>,
}

impl NotificationCapture {
    pub fn new(url: &str, db: i64, config: CaptureConfig, classifier: Arc<Classifier>) -> Self {
        Self {
            url: url.to_string(),
            db,
            config,
            classifier,
        }
    }

    /// The PSUBSCRIBE pattern in use.
    pub fn pattern(&self) -> String {
        self.config.notification_pattern_for(self.db)
    }

    async fn enable_notifications(&self, client: &redis::Client) -> Result<()> {
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ReplicationError::connection(SOURCE, e.to_string()))?;

        let value = self.config.notify_keyspace_events.as_str();
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                ReplicationError::command(
                    SOURCE,
                    "CONFIG",
                    &[b"SET".to_vec(), b"notify-keyspace-events".to_vec(), value.as_bytes().to_vec()],
                    e,
                )
            })?;

        info!(notify_keyspace_events = value, "Enabled keyspace notifications on source");
        Ok(())
    }
}

impl ChangeCapture for NotificationCapture {
    fn strategy(&self) -> ReplicationStrategy {
        ReplicationStrategy::NotificationCapture
    }

    fn start(&self, events: mpsc::Sender<ReplicationAction>) -> BoxFuture<'_, CaptureTask> {
        Box::pin(async move {
            let client = connection::open_client(SOURCE, &self.url)?;

            if self.config.configure_notifications {
                self.enable_notifications(&client).await?;
            }

            let pattern = self.pattern();
            let mut pubsub = client
                .get_async_pubsub()
                .await
                .map_err(|e| ReplicationError::connection(SOURCE, format!("pub/sub connection failed: {}", e)))?;
            pubsub
                .psubscribe(&pattern)
                .await
                .map_err(|e| ReplicationError::connection(SOURCE, format!("PSUBSCRIBE {} failed: {}", pattern, e)))?;

            info!(pattern = %pattern, "Subscribed to keyevent notifications");

            let classifier = Arc::clone(&self.classifier);
            let span = info_span!("capture", strategy = STRATEGY, pattern = %pattern);

            Ok(tokio::spawn(
                async move {
                    let mut messages = pubsub.into_on_message();
                    while let Some(msg) = messages.next().await {
                        metrics::record_capture_event(STRATEGY);
                        let key = msg.get_payload_bytes().to_vec();
                        let action = match translate_notification(&classifier, msg.get_channel_name(), key) {
                            Ok(Some(action)) => action,
                            Ok(None) => continue,
                            Err(e) => {
                                warn!(error = %e, "Skipping malformed notification");
                                metrics::record_capture_parse_error(STRATEGY);
                                continue;
                            }
                        };
                        if events.send(action).await.is_err() {
                            debug!("Live consumer gone, stopping notification reader");
                            return Ok(());
                        }
                    }
                    warn!("Notification feed closed");
                    Err(ReplicationError::connection(SOURCE, "notification feed closed"))
                }
                .instrument(span),
            ))
        })
    }
}
