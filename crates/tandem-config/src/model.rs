// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level tandem configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TandemConfig {
    /// HTTP listener and identity settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Persistent store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Daily batch and cleanup schedule.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Per-connection chat limits and timers.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Cross-instance relay and marker backends.
    #[serde(default)]
    pub bus: BusConfig,
}

/// HTTP server configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Identity of this instance on the message bus. Generated when unset.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Shared secret the identity proxy presents as `Authorization: Bearer`.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("instance_id", &self.instance_id)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            instance_id: None,
            bearer_token: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tandem").join("tandem.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tandem.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Local wall-clock times of the daily jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    #[serde(default = "default_batch_hour")]
    pub batch_hour: u32,

    #[serde(default)]
    pub batch_minute: u32,

    #[serde(default)]
    pub cleanup_hour: u32,

    #[serde(default)]
    pub cleanup_minute: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            batch_hour: default_batch_hour(),
            batch_minute: 0,
            cleanup_hour: 0,
            cleanup_minute: 0,
        }
    }
}

fn default_batch_hour() -> u32 {
    20
}

/// WebSocket connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Capacity of each client's outbound queue.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// Maximum inbound frame size.
    #[serde(default = "default_read_limit_bytes")]
    pub read_limit_bytes: usize,

    /// Read deadline, refreshed on every frame and pong.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Heartbeat ping period. Must be shorter than `pong_wait_secs`.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Deadline for a single outbound write.
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,

    /// Largest gap that still counts as a reply.
    #[serde(default = "default_reply_window_secs")]
    pub reply_window_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            read_limit_bytes: default_read_limit_bytes(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            write_wait_secs: default_write_wait_secs(),
            reply_window_secs: default_reply_window_secs(),
        }
    }
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_read_limit_bytes() -> usize {
    4096
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_reply_window_secs() -> u64 {
    3600
}

/// Which message bus relays chat frames between instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process only; suitable for a single instance.
    #[default]
    Local,
    Redis,
}

/// Where daily match markers live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerBackend {
    /// The `daily_markers` table of the shared database.
    #[default]
    Sqlite,
    Redis,
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,

    #[serde(default = "default_redis_url")]
    pub redis_url: Option<String>,

    /// Pub/sub channel shared by all sessions.
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default)]
    pub markers: MarkerBackend,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            redis_url: default_redis_url(),
            channel: default_channel(),
            markers: MarkerBackend::default(),
        }
    }
}

fn default_redis_url() -> Option<String> {
    Some("redis://localhost:6379/0".to_string())
}

fn default_channel() -> String {
    "chat:messages".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TandemConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chat.send_queue_capacity, 256);
        assert_eq!(config.chat.read_limit_bytes, 4096);
        assert_eq!(config.matching.batch_hour, 20);
        assert_eq!(config.bus.backend, BusBackend::Local);
        assert_eq!(config.bus.markers, MarkerBackend::Sqlite);
        assert_eq!(config.bus.channel, "chat:messages");
    }

    #[test]
    fn debug_redacts_bearer_token() {
        let server = ServerConfig {
            bearer_token: Some("s3cret".into()),
            ..ServerConfig::default()
        };
        let debug = format!("{server:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
