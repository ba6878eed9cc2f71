// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the tandem configuration system.

use tandem_config::diagnostic::ConfigError;
use std::path::Path;

use tandem_config::{
    BusBackend, MarkerBackend, load_and_validate_path, load_and_validate_str, load_config_from_str,
};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "127.0.0.1"
port = 9090
log_level = "debug"
instance_id = "hub-a"

[storage]
database_path = "/tmp/tandem-test.db"
wal_mode = false

[matching]
batch_hour = 19
batch_minute = 30

[chat]
send_queue_capacity = 64
ping_interval_secs = 20
pong_wait_secs = 45

[bus]
backend = "redis"
redis_url = "redis://cache:6379/1"
markers = "redis"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.instance_id.as_deref(), Some("hub-a"));
    assert_eq!(config.storage.database_path, "/tmp/tandem-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.matching.batch_hour, 19);
    assert_eq!(config.matching.batch_minute, 30);
    assert_eq!(config.chat.send_queue_capacity, 64);
    assert_eq!(config.chat.read_limit_bytes, 4096);
    assert_eq!(config.bus.backend, BusBackend::Redis);
    assert_eq!(config.bus.markers, MarkerBackend::Redis);
    assert_eq!(config.bus.channel, "chat:messages");
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.chat.pong_wait_secs, 60);
    assert_eq!(config.chat.reply_window_secs, 3600);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[server]
prot = 8080
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "prot");
            assert_eq!(suggestion.as_deref(), Some("port"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n")
        .expect_err("unknown section must be rejected");
    assert!(format!("{err}").contains("telemetry"));
}

#[test]
fn wrong_type_is_reported() {
    let errors =
        load_and_validate_str("[server]\nport = \"eighty\"\n").expect_err("type mismatch");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn unknown_backend_is_rejected() {
    assert!(load_config_from_str("[bus]\nbackend = \"kafka\"\n").is_err());
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[matching]
cleanup_minute = 75

[chat]
send_queue_capacity = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("invalid values");
    assert_eq!(errors.len(), 2);
    assert!(matches!(
        &errors[0],
        ConfigError::OutOfRange { key, value: 75, .. } if key == "matching.cleanup_minute"
    ));
    assert!(matches!(errors[1], ConfigError::Validation { .. }));
}

#[test]
fn wrong_type_in_a_file_points_at_the_key() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("tandem.toml", "[chat]
send_queue_capacity = 8
pong_wait_secs = \"long\"\n")?;
        let errors = load_and_validate_path(Path::new("tandem.toml"))
            .expect_err("type mismatch must be reported");
        match &errors[0] {
            ConfigError::InvalidType { key, span, .. } => {
                assert_eq!(key, "chat.pong_wait_secs");
                let span = span.as_ref().expect("span inside tandem.toml");
                assert_eq!(span.offset(), "[chat]\nsend_queue_capacity = 8\n".len());
            }
            other => panic!("expected InvalidType, got {other:?}"),
        }
        Ok(())
    });
}

#[test]
fn misspelled_env_override_names_the_variable() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("tandem.toml", "")?;
        jail.set_env("TANDEM_CHAT_SEND_QUEUE_CAPCITY", "8");
        let errors = load_and_validate_path(Path::new("tandem.toml"))
            .expect_err("unknown env key must be rejected");
        match &errors[0] {
            ConfigError::UnknownKey {
                key,
                origin,
                suggestion,
                ..
            } => {
                assert_eq!(key, "send_queue_capcity");
                assert_eq!(origin, "TANDEM_CHAT_SEND_QUEUE_CAPCITY");
                assert_eq!(suggestion.as_deref(), Some("send_queue_capacity"));
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
        Ok(())
    });
}

#[test]
fn env_overrides_reach_every_section() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("tandem.toml", "[server]\nport = 9000\n")?;
        jail.set_env("TANDEM_SERVER_PORT", "9100");
        jail.set_env("TANDEM_STORAGE_WAL_MODE", "false");
        jail.set_env("TANDEM_CHAT_REPLY_WINDOW_SECS", "600");
        jail.set_env("TANDEM_BUS_CHANNEL", "relay");
        let config = load_and_validate_path(Path::new("tandem.toml")).expect("valid overrides");
        assert_eq!(config.server.port, 9100);
        assert!(!config.storage.wal_mode);
        assert_eq!(config.chat.reply_window_secs, 600);
        assert_eq!(config.bus.channel, "relay");
        Ok(())
    });
}
