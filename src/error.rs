// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Errors are categorized by where they surface (endpoint connection,
//! a store command, a malformed transactional read) and carry enough
//! context to tell which key or command broke the run.
//!
//! # Error Categories
//!
//! | Error Type | Skippable | Description |
//! |------------|-----------|-------------|
//! | `Connection` | No | Source/destination unreachable, capture feed dropped |
//! | `Command` | Yes | A store command failed (carries verb + args) |
//! | `Serialization` | Yes | DUMP/PTTL returned a malformed or missing value |
//! | `CaptureParse` | Yes | Malformed MONITOR line or keyevent channel |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Coordinator state machine violation |
//! | `Shutdown` | No | Run is shutting down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Live-Event Policy
//!
//! Every error is fatal during the bulk scan. During live capture the
//! [`LiveErrorPolicy`](crate::config::LiveErrorPolicy) decides: under
//! `LogAndSkip`, errors for which [`ReplicationError::is_skippable()`]
//! returns `true` are logged and the event is dropped. Connection errors
//! always end the run since no reconnection is attempted.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Maximum rendered length of a command argument inside an error message.
const MAX_RENDERED_ARG: usize = 64;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// An endpoint is unreachable or its connection dropped.
    ///
    /// Also raised when a capture feed (MONITOR or PSUBSCRIBE) terminates,
    /// since the run cannot converge without it.
    #[error("Connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// A store-level command failed.
    #[error("Command error ({verb} {args}): {message}")]
    Command {
        verb: String,
        args: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// A transactional read returned a malformed or missing value for a key
    /// that the store reported as existing.
    #[error("Serialization error (key {key}): {message}")]
    Serialization { key: String, message: String },

    /// A capture feed produced something that does not parse.
    ///
    /// The capture reader logs these and moves on to the next entry.
    #[error("Capture parse error: {0}")]
    CaptureParse(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordinator state machine violation (e.g. `run()` called twice).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a connection error for an endpoint.
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a command error from a redis::RedisError raised by `endpoint`.
    ///
    /// I/O-level failures (connection refused, reset, dropped) are mapped to
    /// [`ReplicationError::Connection`] on that endpoint instead, since they
    /// say nothing about the command itself.
    pub fn command(
        endpoint: &str,
        verb: impl Into<String>,
        args: &[Vec<u8>],
        source: redis::RedisError,
    ) -> Self {
        let verb = verb.into();
        if source.is_io_error() || source.is_connection_dropped() || source.is_connection_refusal() {
            return Self::Connection {
                endpoint: endpoint.to_string(),
                message: format!("{} failed: {}", verb, source),
            };
        }
        Self::Command {
            verb,
            args: render_args(args),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a command error without a source.
    pub fn command_msg(verb: impl Into<String>, args: &[Vec<u8>], message: impl Into<String>) -> Self {
        Self::Command {
            verb: verb.into(),
            args: render_args(args),
            message: message.into(),
            source: None,
        }
    }

    /// Check if a live event that failed with this error may be skipped
    /// under the `LogAndSkip` policy.
    pub fn is_skippable(&self) -> bool {
        match self {
            Self::Command { .. } => true,
            Self::Serialization { .. } => true,
            Self::CaptureParse(_) => true,
            Self::Connection { .. } => false, // no reconnection layer
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }
}

impl From<redis::RedisError> for ReplicationError {
    fn from(e: redis::RedisError) -> Self {
        Self::command("unknown", "unknown", &[], e)
    }
}

/// Render command arguments for error messages: lossy UTF-8, each argument
/// truncated to [`MAX_RENDERED_ARG`] characters.
pub fn render_args(args: &[Vec<u8>]) -> String {
    args.iter()
        .map(|arg| {
            let text = String::from_utf8_lossy(arg);
            if text.chars().count() > MAX_RENDERED_ARG {
                let truncated: String = text.chars().take(MAX_RENDERED_ARG).collect();
                format!("{}...", truncated)
            } else {
                text.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
