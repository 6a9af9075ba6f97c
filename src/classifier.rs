// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command classification.
//!
//! Maps a raw mutation verb observed on the source to a replication action.
//! The mapping is data: a [`CommandTable`] with two buckets, built once at
//! startup and shared read-only behind an `Arc<Classifier>`.
//!
//! | Bucket | Action | Examples |
//! |--------|--------|----------|
//! | `replay` | Apply the identical command to the destination | `del`, `expire`, `hset`, `sadd`, `zadd`, `set` |
//! | `copy` | Re-read and overwrite the affected key(s) | `incr`, `lpush`, `rename`, `spop`, `blpop` |
//! | anything else | Ignore | `get`, `scan`, `flushall`, unknown verbs |
//!
//! Unknown verbs are never replayed, so a command nobody reviewed cannot
//! reach the destination.
//!
//! # Key Argument Conventions
//!
//! A copy verb's affected keys are located by its [`KeyArgs`] entry rather
//! than assuming argument zero: blocking pops list several keys followed by a
//! timeout, `blmove` names a source and a destination key.

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Classification of a verb, without arguments bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Replay,
    CopyKey,
    Ignore,
}

/// What to do at the destination for one observed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationAction {
    /// Apply the identical command to the destination.
    Replay { verb: String, args: Vec<Vec<u8>> },
    /// Copy the key's full value and TTL from the source.
    CopyKey(Vec<u8>),
    /// Remove the key at the destination.
    Delete(Vec<u8>),
    /// No destination effect.
    Ignore,
}

impl ReplicationAction {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replay { .. } => "replay",
            Self::CopyKey(_) => "copy",
            Self::Delete(_) => "delete",
            Self::Ignore => "ignore",
        }
    }

    /// The key this action targets, if it names a single key.
    ///
    /// Replays report their first argument, which is the key for every verb
    /// in the default replay bucket except `mset`/`msetnx`.
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Self::Replay { args, .. } => args.first().map(|a| a.as_slice()),
            Self::CopyKey(key) | Self::Delete(key) => Some(key.as_slice()),
            Self::Ignore => None,
        }
    }
}

/// Where a copy verb keeps its affected keys in the argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyArgs {
    /// The first argument is the key (`spop key [count]`).
    First,
    /// Every argument except the last (`blpop k1 k2 ... timeout`).
    AllButLast,
    /// Explicit zero-based argument positions (`blmove src dst ...` → `[0, 1]`).
    Positions(Vec<usize>),
}

impl KeyArgs {
    /// Extract the keys from an argument list. Positions past the end are skipped.
    pub fn extract<'a>(&self, args: &'a [Vec<u8>]) -> Vec<&'a [u8]> {
        match self {
            KeyArgs::First => args.first().map(|a| vec![a.as_slice()]).unwrap_or_default(),
            KeyArgs::AllButLast => {
                let n = args.len().saturating_sub(1);
                args[..n].iter().map(|a| a.as_slice()).collect()
            }
            KeyArgs::Positions(positions) => positions
                .iter()
                .filter_map(|&i| args.get(i).map(|a| a.as_slice()))
                .collect(),
        }
    }
}

/// Verbs that leave the same state when applied twice. Capture starts
/// before the scan, so a write can reach the destination both through the
/// copy and through replay.
const DEFAULT_REPLAY_VERBS: &[&str] = &[
    // keyspace
    "del", "unlink", "expire", "pexpire", "expireat", "pexpireat", "persist",
    // strings
    "set", "setex", "psetex", "setnx", "mset", "msetnx", "setrange",
    // hashes
    "hset", "hmset", "hsetnx", "hdel",
    // sets
    "sadd", "srem",
    // sorted sets
    "zadd", "zrem", "zremrangebyscore", "zremrangebyrank", "zremrangebylex",
    // lists
    "ltrim",
];

/// The verb classification table.
///
/// Both buckets are keyed by lowercase verb. A verb may appear in at most
/// one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTable {
    /// Verbs whose effect is fully determined by verb + args and does not
    /// compound when applied twice.
    #[serde(default = "default_replay")]
    pub replay: BTreeSet<String>,

    /// Verbs whose effect cannot be replayed deterministically, with the
    /// position of their key arguments.
    #[serde(default = "default_copy")]
    pub copy: BTreeMap<String, KeyArgs>,

    /// Keyevent names with no command of the same name (`expired`,
    /// `rename_to`, `zincr`, ...) that still trigger a key copy under
    /// notification capture.
    #[serde(default = "default_notification_events")]
    pub notification_events: BTreeSet<String>,
}

fn default_replay() -> BTreeSet<String> {
    DEFAULT_REPLAY_VERBS.iter().map(|v| v.to_string()).collect()
}

fn default_copy() -> BTreeMap<String, KeyArgs> {
    let mut copy = BTreeMap::new();
    // Applying these twice compounds
    for verb in [
        "incr", "incrby", "decr", "decrby", "append", "getset", "getdel", "hincrby", "zincrby",
        "lpush", "rpush", "lpushx", "rpushx", "lpop", "rpop", "lset", "linsert", "lrem",
    ] {
        copy.insert(verb.to_string(), KeyArgs::First);
    }
    // Source and destination key; a vanished source becomes a delete
    for verb in ["rename", "renamenx", "smove", "rpoplpush", "lmove"] {
        copy.insert(verb.to_string(), KeyArgs::Positions(vec![0, 1]));
    }
    // Random member removal
    copy.insert("spop".to_string(), KeyArgs::First);
    // Float formatting may differ between instances
    copy.insert("incrbyfloat".to_string(), KeyArgs::First);
    copy.insert("hincrbyfloat".to_string(), KeyArgs::First);
    // Pops whose count argument is optional; copying is simpler than parsing
    copy.insert("zpopmin".to_string(), KeyArgs::First);
    copy.insert("zpopmax".to_string(), KeyArgs::First);
    // Blocking variants would block the destination connection if replayed
    for verb in ["blpop", "brpop", "bzpopmin", "bzpopmax"] {
        copy.insert(verb.to_string(), KeyArgs::AllButLast);
    }
    copy.insert("brpoplpush".to_string(), KeyArgs::Positions(vec![0, 1]));
    copy.insert("blmove".to_string(), KeyArgs::Positions(vec![0, 1]));
    // Replaying RESTORE without REPLACE fails on an existing key
    copy.insert("restore".to_string(), KeyArgs::First);
    // Auto-generated entry IDs differ per instance
    for verb in ["xadd", "xtrim", "xdel"] {
        copy.insert(verb.to_string(), KeyArgs::First);
    }
    copy
}

const DEFAULT_NOTIFICATION_EVENTS: &[&str] = &[
    "expired", "evicted", "rename_from", "rename_to", "move_from", "move_to", "copy_to", "zincr",
    "sinterstore", "sunionstore", "sdiffstore", "zinterstore", "zunionstore", "zdiffstore",
];

fn default_notification_events() -> BTreeSet<String> {
    DEFAULT_NOTIFICATION_EVENTS.iter().map(|v| v.to_string()).collect()
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            replay: default_replay(),
            copy: default_copy(),
            notification_events: default_notification_events(),
        }
    }
}

impl CommandTable {
    /// Reject tables where a verb sits in both buckets.
    pub fn validate(&self) -> Result<()> {
        for verb in &self.replay {
            if self.copy.keys().any(|c| c.eq_ignore_ascii_case(verb)) {
                return Err(ReplicationError::Config(format!(
                    "verb {:?} is in both the replay and copy buckets",
                    verb
                )));
            }
        }
        Ok(())
    }

    /// Lowercase every verb.
    fn normalized(self) -> Self {
        Self {
            replay: self.replay.into_iter().map(|v| v.to_ascii_lowercase()).collect(),
            copy: self
                .copy
                .into_iter()
                .map(|(v, k)| (v.to_ascii_lowercase(), k))
                .collect(),
            notification_events: self
                .notification_events
                .into_iter()
                .map(|v| v.to_ascii_lowercase())
                .collect(),
        }
    }
}

/// Read-only classifier over a validated [`CommandTable`].
#[derive(Debug, Clone)]
pub struct Classifier {
    table: CommandTable,
}

impl Classifier {
    /// Validate and freeze a table.
    pub fn new(table: CommandTable) -> Result<Self> {
        table.validate()?;
        Ok(Self {
            table: table.normalized(),
        })
    }

    /// Classify a verb (case-insensitive). Total: unknown verbs are `Ignore`.
    pub fn classify(&self, verb: &str) -> ActionKind {
        let verb = verb.to_ascii_lowercase();
        if self.table.replay.contains(&verb) {
            ActionKind::Replay
        } else if self.table.copy.contains_key(&verb) {
            ActionKind::CopyKey
        } else {
            ActionKind::Ignore
        }
    }

    /// Whether the verb is in either bucket.
    pub fn is_recognized(&self, verb: &str) -> bool {
        self.classify(verb) != ActionKind::Ignore
    }

    /// Whether a keyevent name should trigger a key copy: any verb in either
    /// bucket, plus the notification-only event names.
    pub fn is_recognized_event(&self, event: &str) -> bool {
        self.is_recognized(event)
            || self
                .table
                .notification_events
                .contains(&event.to_ascii_lowercase())
    }

    /// Keys affected by a copy verb, per its [`KeyArgs`] convention.
    ///
    /// Empty for verbs outside the copy bucket.
    pub fn copy_keys<'a>(&self, verb: &str, args: &'a [Vec<u8>]) -> Vec<&'a [u8]> {
        self.table
            .copy
            .get(&verb.to_ascii_lowercase())
            .map(|key_args| key_args.extract(args))
            .unwrap_or_default()
    }

    /// Translate an observed command into destination actions.
    ///
    /// Replay verbs yield one `Replay` carrying the command's own arguments
    /// (verb lowercased). Copy verbs yield one `CopyKey` per affected key.
    /// Ignored verbs yield nothing.
    pub fn actions_for_command(&self, verb: &str, args: Vec<Vec<u8>>) -> Vec<ReplicationAction> {
        match self.classify(verb) {
            ActionKind::Replay => vec![ReplicationAction::Replay {
                verb: verb.to_ascii_lowercase(),
                args,
            }],
            ActionKind::CopyKey => self
                .copy_keys(verb, &args)
                .into_iter()
                .map(|key| ReplicationAction::CopyKey(key.to_vec()))
                .collect(),
            ActionKind::Ignore => Vec::new(),
        }
    }

    /// The underlying table.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            table: CommandTable::default(),
        }
    }
}
