// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MONITOR-based capture.
//!
//! The source echoes every command it executes on a MONITOR connection as
//! one line:
//!
//! ```text
//! 1339518083.107412 [0 127.0.0.1:60866] "hset" "user:1" "name" "ada"
//! ^ secs.micros      ^db ^client         ^verb  ^args...
//! ```
//!
//! Arguments are double-quoted with C-style escapes (`\"`, `\\`, `\n`, `\r`,
//! `\t`, `\a`, `\b`, `\xHH`). The client token is `ip:port`, `unix:<path>`,
//! or `lua` for commands issued from a script.
//!
//! Lines for other databases are dropped. Malformed lines are logged and
//! skipped; they never end the feed.

use crate::capture::{CaptureTask, ChangeCapture};
use crate::classifier::{Classifier, ReplicationAction};
use crate::config::ReplicationStrategy;
use crate::connection;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::store::{BoxFuture, SOURCE};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

const STRATEGY: &str = "monitor";

/// One parsed MONITOR line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    /// Seconds since the epoch, with microsecond precision.
    pub timestamp: f64,
    pub db: i64,
    /// Client token: `ip:port`, `[ipv6]:port`, `unix:<path>`, or `lua`.
    pub client: String,
    /// Lowercased command name.
    pub verb: String,
    pub args: Vec<Vec<u8>>,
}

fn malformed(line: &str, reason: &str) -> ReplicationError {
    let shown: String = line.chars().take(120).collect();
    ReplicationError::CaptureParse(format!("{} in MONITOR line {:?}", reason, shown))
}

/// Parse one MONITOR line.
pub fn parse_monitor_line(line: &str) -> Result<RawCommand> {
    let (ts, rest) = line.split_once(' ').ok_or_else(|| malformed(line, "missing timestamp"))?;
    let timestamp: f64 = ts.parse().map_err(|_| malformed(line, "bad timestamp"))?;

    let rest = rest.strip_prefix('[').ok_or_else(|| malformed(line, "missing '['"))?;
    let (db, rest) = rest.split_once(' ').ok_or_else(|| malformed(line, "missing client"))?;
    let db: i64 = db.parse().map_err(|_| malformed(line, "bad database index"))?;

    // IPv6 clients carry their own brackets: `[0 [::1]:53422]`
    let close = rest
        .match_indices(']')
        .map(|(i, _)| i)
        .find(|&i| matches!(rest.as_bytes().get(i + 1), None | Some(b' ')))
        .ok_or_else(|| malformed(line, "missing ']'"))?;
    let client = &rest[..close];
    if client.is_empty() {
        return Err(malformed(line, "missing client"));
    }

    let mut parts = parse_quoted(&rest[close + 1..]).map_err(|reason| malformed(line, reason))?;
    if parts.is_empty() {
        return Err(malformed(line, "no command"));
    }
    let verb = String::from_utf8_lossy(&parts.remove(0)).to_ascii_lowercase();

    Ok(RawCommand {
        timestamp,
        db,
        client: client.to_string(),
        verb,
        args: parts,
    })
}

/// Split a run of space-separated, double-quoted, escaped strings.
fn parse_quoted(body: &str) -> std::result::Result<Vec<Vec<u8>>, &'static str> {
    let bytes = body.as_bytes();
    let mut args = Vec::new();
    let mut i = 0;

    loop {
        while bytes.get(i) == Some(&b' ') {
            i += 1;
        }
        if i >= bytes.len() {
            return Ok(args);
        }
        if bytes[i] != b'"' {
            return Err("unquoted argument");
        }
        i += 1;

        let mut arg = Vec::new();
        loop {
            match *bytes.get(i).ok_or("unterminated argument")? {
                b'"' => {
                    i += 1;
                    break;
                }
                b'\\' => {
                    let escape = *bytes.get(i + 1).ok_or("dangling escape")?;
                    i += 2;
                    let byte = match escape {
                        b'\\' => b'\\',
                        b'"' => b'"',
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'a' => 0x07,
                        b'b' => 0x08,
                        b'x' => {
                            let hex = bytes.get(i..i + 2).ok_or("short \\x escape")?;
                            i += 2;
                            std::str::from_utf8(hex)
                                .ok()
                                .and_then(|h| u8::from_str_radix(h, 16).ok())
                                .ok_or("bad \\x escape")?
                        }
                        _ => return Err("unknown escape"),
                    };
                    arg.push(byte);
                }
                other => {
                    arg.push(other);
                    i += 1;
                }
            }
        }

        if i < bytes.len() && bytes[i] != b' ' {
            return Err("text after closing quote");
        }
        args.push(arg);
    }
}

/// Turn a parsed command into destination actions.
///
/// Commands for other databases and unclassified verbs produce nothing.
pub fn translate_command(classifier: &Classifier, db: i64, raw: RawCommand) -> Vec<ReplicationAction> {
    if raw.db != db {
        return Vec::new();
    }
    if !classifier.is_recognized(&raw.verb) {
        debug!(verb = %raw.verb, client = %raw.client, "Unclassified verb, ignoring");
        metrics::record_classification_gap(STRATEGY);
        return Vec::new();
    }
    classifier.actions_for_command(&raw.verb, raw.args)
}

/// Capture over a dedicated MONITOR connection to the source.
pub struct CommandStreamCapture {
    url: String,
    db: i64,
    classifier: Arc<Classifier>,
}

impl CommandStreamCapture {
    pub fn new(url: &str, db: i64, classifier: Arc<Classifier>) -> Self {
        Self {
            url: url.to_string(),
            db,
            classifier,
        }
    }
}

impl ChangeCapture for CommandStreamCapture {
    fn strategy(&self) -> ReplicationStrategy {
        ReplicationStrategy::CommandStreamCapture
    }

    fn start(&self, events: mpsc::Sender<ReplicationAction>) -> BoxFuture<'_, CaptureTask> {
        Box::pin(async move {
            let client = connection::open_client(SOURCE, &self.url)?;
            let mut monitor = client
                .get_async_monitor()
                .await
                .map_err(|e| ReplicationError::connection(SOURCE, format!("MONITOR connection failed: {}", e)))?;
            monitor
                .monitor()
                .await
                .map_err(|e| ReplicationError::connection(SOURCE, format!("MONITOR rejected: {}", e)))?;

            info!(db = self.db, "MONITOR feed established");

            let classifier = Arc::clone(&self.classifier);
            let db = self.db;
            let span = info_span!("capture", strategy = STRATEGY, db);

            Ok(tokio::spawn(
                async move {
                    let mut lines = monitor.into_on_message::<String>();
                    while let Some(line) = lines.next().await {
                        metrics::record_capture_event(STRATEGY);
                        let raw = match parse_monitor_line(&line) {
                            Ok(raw) => raw,
                            Err(e) => {
                                warn!(error = %e, "Skipping malformed MONITOR line");
                                metrics::record_capture_parse_error(STRATEGY);
                                continue;
                            }
                        };
                        for action in translate_command(&classifier, db, raw) {
                            if events.send(action).await.is_err() {
                                debug!("Live consumer gone, stopping MONITOR reader");
                                return Ok(());
                            }
                        }
                    }
                    warn!("MONITOR feed closed");
                    Err(ReplicationError::connection(SOURCE, "MONITOR feed closed"))
                }
                .instrument(span),
            ))
        })
    }
}
