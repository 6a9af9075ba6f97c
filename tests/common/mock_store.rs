//! In-memory stores and a scripted capture for coordinator tests.
//!
//! `MockSource` pages SCAN over a sorted key map, `MockDestination` records
//! every write and applies it to its own map, and `ScriptedCapture` feeds a
//! fixed list of actions into the live channel.

use redis_replicator::store::{BoxFuture, DestinationStore, KeySnapshot, ScanPage, SourceStore};
use redis_replicator::{ChangeCapture, ReplicationAction, ReplicationError, ReplicationStrategy};
use redis_replicator::capture::CaptureTask;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ordered record of what happened, shared between mocks.
#[derive(Default, Clone)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

/// A stored source key: serialized value plus PTTL as Redis reports it.
#[derive(Debug, Clone)]
struct SourceEntry {
    value: Vec<u8>,
    pttl_ms: i64,
}

/// Source backed by a sorted map. The SCAN cursor is the index of the next key.
pub struct MockSource {
    keys: Mutex<BTreeMap<Vec<u8>, SourceEntry>>,
    scans: Mutex<Vec<(u64, usize, Option<String>)>>,
    /// Snapshot of this key fails with a connection error
    fail_snapshot_of: Mutex<Option<Vec<u8>>>,
    log: EventLog,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_log(EventLog::default())
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            keys: Mutex::new(BTreeMap::new()),
            scans: Mutex::new(Vec::new()),
            fail_snapshot_of: Mutex::new(None),
            log,
        }
    }

    /// Insert a key without expiry.
    pub fn set(&self, key: &str, value: &[u8]) {
        self.set_with_pttl(key, value, -1);
    }

    pub fn set_with_pttl(&self, key: &str, value: &[u8], pttl_ms: i64) {
        self.keys.lock().unwrap().insert(
            key.as_bytes().to_vec(),
            SourceEntry {
                value: value.to_vec(),
                pttl_ms,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.keys.lock().unwrap().remove(key.as_bytes());
    }

    pub fn fail_snapshot_of(&self, key: &str) {
        *self.fail_snapshot_of.lock().unwrap() = Some(key.as_bytes().to_vec());
    }

    /// Every SCAN request as (cursor, count, pattern).
    pub fn scans(&self) -> Vec<(u64, usize, Option<String>)> {
        self.scans.lock().unwrap().clone()
    }
}

/// `prefix*` or exact match.
fn glob_matches(pattern: &str, key: &[u8]) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix.as_bytes()),
        None => key == pattern.as_bytes(),
    }
}

impl SourceStore for MockSource {
    fn scan<'a>(&'a self, cursor: u64, count: usize, pattern: Option<&'a str>) -> BoxFuture<'a, ScanPage> {
        self.scans.lock().unwrap().push((cursor, count, pattern.map(String::from)));
        self.log.push(format!("scan:{}", cursor));

        let all: Vec<Vec<u8>> = self.keys.lock().unwrap().keys().cloned().collect();
        let start = cursor as usize;
        let end = (start + count).min(all.len());
        let keys = all[start.min(all.len())..end]
            .iter()
            .filter(|k| pattern.map_or(true, |p| glob_matches(p, k)))
            .cloned()
            .collect();
        let next = if end >= all.len() { 0 } else { end as u64 };

        Box::pin(async move { Ok(ScanPage { cursor: next, keys }) })
    }

    fn snapshot<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, KeySnapshot> {
        let failing = self.fail_snapshot_of.lock().unwrap().as_deref() == Some(key);
        let entry = self.keys.lock().unwrap().get(key).cloned();

        Box::pin(async move {
            if failing {
                return Err(ReplicationError::connection("source", "connection reset"));
            }
            Ok(match entry {
                Some(entry) => KeySnapshot {
                    value: Some(entry.value),
                    pttl_ms: entry.pttl_ms,
                },
                None => KeySnapshot {
                    value: None,
                    pttl_ms: -2,
                },
            })
        })
    }
}

/// A recorded destination write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestOp {
    Restore { key: String, ttl_ms: u64 },
    Delete { key: String },
    Replay { verb: String, args: Vec<String> },
}

/// How an injected failure surfaces.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Rejected command, skippable under log-and-skip
    Command,
    /// Lost connection, always fatal
    Connection,
}

impl Failure {
    fn error(self, verb: &str, args: &[Vec<u8>]) -> ReplicationError {
        match self {
            Failure::Command => ReplicationError::command_msg(verb, args, "ERR injected failure"),
            Failure::Connection => ReplicationError::connection("destination", "broken pipe"),
        }
    }
}

/// Destination that records writes and keeps the resulting key map.
pub struct MockDestination {
    keys: Mutex<HashMap<String, (Vec<u8>, u64)>>,
    ops: Mutex<Vec<DestOp>>,
    failing_verbs: Mutex<HashMap<String, Failure>>,
    /// Restores allowed before every further restore fails
    restore_budget: AtomicUsize,
}

impl MockDestination {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            failing_verbs: Mutex::new(HashMap::new()),
            restore_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Replays of `verb` fail with `failure`.
    pub fn fail_replays_of(&self, verb: &str, failure: Failure) {
        self.failing_verbs.lock().unwrap().insert(verb.to_string(), failure);
    }

    /// Allow `n` restores, then fail every restore with a connection error.
    pub fn fail_restores_after(&self, n: usize) {
        self.restore_budget.store(n, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<DestOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.keys.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.keys.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    /// Poll until at least `n` writes were attempted.
    pub async fn wait_for_ops(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.ops.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} ops, have {:?}", n, self.ops()));
    }

    fn record(&self, op: DestOp) {
        self.ops.lock().unwrap().push(op);
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl DestinationStore for MockDestination {
    fn restore<'a>(&'a self, key: &'a [u8], ttl_ms: u64, value: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record(DestOp::Restore {
                key: lossy(key),
                ttl_ms,
            });
            let allowed = self
                .restore_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(Failure::Connection.error("restore", &[key.to_vec()]));
            }
            self.keys.lock().unwrap().insert(lossy(key), (value.to_vec(), ttl_ms));
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record(DestOp::Delete { key: lossy(key) });
            self.keys.lock().unwrap().remove(&lossy(key));
            Ok(())
        })
    }

    fn replay<'a>(&'a self, verb: &'a str, args: &'a [Vec<u8>]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record(DestOp::Replay {
                verb: verb.to_string(),
                args: args.iter().map(|a| lossy(a)).collect(),
            });
            if let Some(failure) = self.failing_verbs.lock().unwrap().get(verb).copied() {
                return Err(failure.error(verb, args));
            }

            let mut keys = self.keys.lock().unwrap();
            match (verb, args) {
                ("set", [key, value, ..]) => {
                    keys.insert(lossy(key), (value.clone(), 0));
                }
                ("del", keys_to_delete) => {
                    for key in keys_to_delete {
                        keys.remove(&lossy(key));
                    }
                }
                ("incr", [key]) => {
                    let entry = keys.entry(lossy(key)).or_insert_with(|| (b"0".to_vec(), 0));
                    let n: i64 = String::from_utf8_lossy(&entry.0).parse().unwrap_or(0);
                    entry.0 = (n + 1).to_string().into_bytes();
                }
                ("flushall", _) | ("flushdb", _) => keys.clear(),
                _ => {}
            }
            Ok(())
        })
    }
}

/// Capture that sends a fixed list of actions once subscribed.
pub struct ScriptedCapture {
    actions: Vec<ReplicationAction>,
    /// Hold the feed open after the script instead of closing it
    keep_open: bool,
    log: EventLog,
}

impl ScriptedCapture {
    /// Feed that stays open until the run ends.
    pub fn open(actions: Vec<ReplicationAction>) -> Self {
        Self {
            actions,
            keep_open: true,
            log: EventLog::default(),
        }
    }

    /// Feed that terminates after the script, like a dropped MONITOR connection.
    pub fn closing(actions: Vec<ReplicationAction>) -> Self {
        Self {
            keep_open: false,
            ..Self::open(actions)
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }
}

impl ChangeCapture for ScriptedCapture {
    fn strategy(&self) -> ReplicationStrategy {
        ReplicationStrategy::CommandStreamCapture
    }

    fn start(&self, events: mpsc::Sender<ReplicationAction>) -> BoxFuture<'_, CaptureTask> {
        let actions = self.actions.clone();
        let keep_open = self.keep_open;
        let log = self.log.clone();

        Box::pin(async move {
            log.push("capture:subscribed");
            let task: CaptureTask = tokio::spawn(async move {
                for action in actions {
                    if events.send(action).await.is_err() {
                        return Ok(());
                    }
                }
                if keep_open {
                    std::future::pending::<()>().await;
                }
                Err(ReplicationError::connection("source", "MONITOR feed closed"))
            });
            Ok(task)
        })
    }
}

/// Shorthand for a replay action from string arguments.
pub fn replay(verb: &str, args: &[&str]) -> ReplicationAction {
    ReplicationAction::Replay {
        verb: verb.to_string(),
        args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
    }
}

pub fn copy_key(key: &str) -> ReplicationAction {
    ReplicationAction::CopyKey(key.as_bytes().to_vec())
}

pub fn delete(key: &str) -> ReplicationAction {
    ReplicationAction::Delete(key.as_bytes().to_vec())
}
