// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::{BusBackend, MarkerBackend, TandemConfig};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &TandemConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(invalid("server.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(invalid(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path must not be empty"));
    }

    let m = &config.matching;
    for (key, hour) in [("batch_hour", m.batch_hour), ("cleanup_hour", m.cleanup_hour)] {
        if hour > 23 {
            errors.push(ConfigError::OutOfRange {
                key: format!("matching.{key}"),
                value: hour,
                range: "0..=23",
            });
        }
    }
    for (key, minute) in [
        ("batch_minute", m.batch_minute),
        ("cleanup_minute", m.cleanup_minute),
    ] {
        if minute > 59 {
            errors.push(ConfigError::OutOfRange {
                key: format!("matching.{key}"),
                value: minute,
                range: "0..=59",
            });
        }
    }

    let c = &config.chat;
    for (key, value) in [
        ("send_queue_capacity", c.send_queue_capacity as u64),
        ("read_limit_bytes", c.read_limit_bytes as u64),
        ("write_wait_secs", c.write_wait_secs),
        ("reply_window_secs", c.reply_window_secs),
    ] {
        if value == 0 {
            errors.push(invalid(format!("chat.{key} must be at least 1")));
        }
    }
    if c.ping_interval_secs == 0 || c.ping_interval_secs >= c.pong_wait_secs {
        errors.push(ConfigError::HeartbeatOrder {
            ping_secs: c.ping_interval_secs,
            pong_wait_secs: c.pong_wait_secs,
        });
    }

    let has_url = config
        .bus
        .redis_url
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty());
    if !has_url {
        if config.bus.backend == BusBackend::Redis {
            errors.push(ConfigError::MissingRedisUrl {
                selected: "bus.backend",
            });
        } else if config.bus.markers == MarkerBackend::Redis {
            errors.push(ConfigError::MissingRedisUrl {
                selected: "bus.markers",
            });
        }
    }
    if config.bus.channel.trim().is_empty() {
        errors.push(invalid("bus.channel must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
