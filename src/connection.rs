// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Endpoint connection setup.
//!
//! Connections are established once at startup with bounded retry. Each
//! attempt is wrapped in a timeout so an unreachable host fails fast instead
//! of hanging on TCP connect. There is no reconnection once the run is
//! underway.

use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::resilience::RetryConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Parse a URL into a client without connecting.
pub fn open_client(endpoint: &str, url: &str) -> Result<Client> {
    Client::open(url).map_err(|e| ReplicationError::connection(endpoint, format!("Invalid Redis URL: {}", e)))
}

/// Establish a multiplexed connection, retrying per `retry`.
pub async fn connect_with_retry(endpoint: &str, client: &Client, retry: &RetryConfig) -> Result<ConnectionManager> {
    info!(endpoint, "Connecting");

    let mut attempt = 0;
    loop {
        attempt += 1;

        let failure = match timeout(retry.attempt_timeout, client.get_connection_manager()).await {
            Ok(Ok(conn)) => {
                metrics::record_connection(endpoint, true);
                if attempt > 1 {
                    info!(endpoint, attempt, "Connected after retry");
                } else {
                    info!(endpoint, "Connected");
                }
                return Ok(conn);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", retry.attempt_timeout.as_millis()),
        };

        metrics::record_connection(endpoint, false);

        if attempt >= retry.attempts {
            error!(endpoint, attempt, error = %failure, "Failed to connect after max retries");
            return Err(ReplicationError::connection(
                endpoint,
                format!("Connection failed after {} attempts: {}", attempt, failure),
            ));
        }

        let delay = retry.backoff(attempt);
        warn!(
            endpoint,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Connection attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_client_rejects_bad_url() {
        let err = open_client("source", "not-a-url").unwrap_err();
        assert!(matches!(err, ReplicationError::Connection { ref endpoint, .. } if endpoint == "source"));
    }

    #[test]
    fn test_open_client_accepts_url() {
        assert!(open_client("destination", "redis://127.0.0.1:6379/2").is_ok());
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_max_attempts() {
        // Port 1 is closed on any sane test host
        let client = open_client("source", "redis://127.0.0.1:1").unwrap();
        let err = connect_with_retry("source", &client, &RetryConfig::testing())
            .await
            .err()
            .expect("expected connection to fail");
        match err {
            ReplicationError::Connection { endpoint, message } => {
                assert_eq!(endpoint, "source");
                assert!(message.contains("3 attempts"));
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }
}
