// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/tandem/tandem.toml`
//! 3. `~/.config/tandem/tandem.toml`
//! 4. `./tandem.toml`
//! 5. `TANDEM_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TandemConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/tandem/tandem.toml";
pub(crate) const LOCAL_CONFIG: &str = "tandem.toml";

/// Prefix of environment variable overrides.
pub(crate) const ENV_PREFIX: &str = "TANDEM_";

/// Config sections that environment variables may address.
pub(crate) const SECTIONS: &[&str] = &["server", "storage", "matching", "chat", "bus"];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tandem").join("tandem.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<TandemConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<TandemConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TandemConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `TANDEM_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` since keys themselves
/// contain underscores: `TANDEM_CHAT_SEND_QUEUE_CAPACITY` must become
/// `chat.send_queue_capacity`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

/// `key` arrives with the prefix stripped but in its original case.
fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}
