// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed bus and marker store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tandem_core::{
    AdapterType, Envelope, HealthStatus, MarkerStore, MessageBus, PluginAdapter, SessionId,
    TandemError, UserId, marker_key,
};

use crate::SUBSCRIBER_CAPACITY;

/// Deletes the key only if it still holds the expected value.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

fn bus_err(message: &str, e: redis::RedisError) -> TandemError {
    TandemError::Bus {
        message: format!("{message}: {e}"),
        source: Some(Box::new(e)),
    }
}

async fn connect(url: &str) -> Result<(redis::Client, ConnectionManager), TandemError> {
    let client = redis::Client::open(url).map_err(|e| bus_err("invalid redis url", e))?;
    let conn = ConnectionManager::new(client.clone())
        .await
        .map_err(|e| bus_err("failed to open redis connection", e))?;
    Ok((client, conn))
}

async fn ping(conn: &ConnectionManager) -> HealthStatus {
    let mut conn = conn.clone();
    let reply: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    match reply {
        Ok(_) => HealthStatus::Healthy,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    }
}

/// Pub/sub relay over a single Redis channel shared by all sessions.
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
    channel: String,
}

impl RedisBus {
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, TandemError> {
        let (client, conn) = connect(url).await?;
        Ok(Self {
            client,
            conn,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for RedisBus {
    fn name(&self) -> &str {
        "redis"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bus
    }

    async fn health_check(&self) -> Result<HealthStatus, TandemError> {
        Ok(ping(&self.conn).await)
    }

    async fn shutdown(&self) -> Result<(), TandemError> {
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TandemError> {
        let payload = serde_json::to_string(envelope).map_err(|e| TandemError::Bus {
            message: "failed to encode envelope".into(),
            source: Some(Box::new(e)),
        })?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| bus_err("publish failed", e))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Envelope>, TandemError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| bus_err("failed to open pubsub connection", e))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| bus_err("subscribe failed", e))?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "non-text bus payload skipped");
                        continue;
                    }
                };
                let envelope: Envelope = match serde_json::from_str(&payload) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!(error = %e, "malformed bus envelope skipped");
                        continue;
                    }
                };
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
            debug!(channel = %channel, "redis subscription closed");
        });
        Ok(rx)
    }
}

/// Daily markers as `match:<user>:<YYYY-MM-DD>` keys with native expiry.
pub struct RedisMarkerStore {
    conn: ConnectionManager,
}

impl RedisMarkerStore {
    pub async fn connect(url: &str) -> Result<Self, TandemError> {
        let (_, conn) = connect(url).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl PluginAdapter for RedisMarkerStore {
    fn name(&self) -> &str {
        "redis-markers"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Markers
    }

    async fn health_check(&self) -> Result<HealthStatus, TandemError> {
        Ok(ping(&self.conn).await)
    }

    async fn shutdown(&self) -> Result<(), TandemError> {
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for RedisMarkerStore {
    async fn try_mark(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
        ttl: Duration,
    ) -> Result<bool, TandemError> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(marker_key(user, day))
            .arg(session.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(|e| bus_err("marker SET failed", e))?;
        Ok(reply.is_some())
    }

    async fn get_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<SessionId>, TandemError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(marker_key(user, day))
            .await
            .map_err(|e| bus_err("marker GET failed", e))?;
        Ok(value.map(SessionId))
    }

    async fn clear_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
    ) -> Result<(), TandemError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(marker_key(user, day))
            .arg(session.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| bus_err("marker release failed", e))?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, TandemError> {
        Ok(0)
    }
}
