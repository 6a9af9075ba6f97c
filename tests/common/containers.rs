// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for Redis.
//!
//! Each end-to-end test runs a source and a destination in separate
//! containers.

use redis::aio::MultiplexedConnection;
use std::time::Duration;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla Redis container.
///
/// Uses the official redis:7 image. Waits for "Ready to accept connections".
pub fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Get the Redis URL for a container.
pub fn redis_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(6379);
    format!("redis://127.0.0.1:{}", port)
}

/// One Redis container plus a client connection for seeding and assertions.
pub struct TestRedis<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub url: String,
}

impl<'a> TestRedis<'a> {
    pub fn new(docker: &'a Cli) -> Self {
        let container = redis_container(docker);
        let url = redis_url(&container);
        Self { container, url }
    }

    pub async fn conn(&self) -> MultiplexedConnection {
        let client = redis::Client::open(self.url.as_str()).unwrap();
        client.get_multiplexed_async_connection().await.unwrap()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn().await;
        redis::cmd("GET").arg(key).query_async(&mut conn).await.unwrap()
    }

    pub async fn pttl(&self, key: &str) -> i64 {
        let mut conn = self.conn().await;
        redis::cmd("PTTL").arg(key).query_async(&mut conn).await.unwrap()
    }

    pub async fn dbsize(&self) -> u64 {
        let mut conn = self.conn().await;
        redis::cmd("DBSIZE").query_async(&mut conn).await.unwrap()
    }

    /// Poll until `key` holds `expected` (or is absent when `None`).
    pub async fn wait_for_value(&self, key: &str, expected: Option<&[u8]>) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let current = self.get(key).await;
            if current.as_deref() == expected {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("{} is {:?}, expected {:?}", key, current, expected);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
