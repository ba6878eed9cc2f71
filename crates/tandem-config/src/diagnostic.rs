// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration errors rendered as miette diagnostics.
//!
//! Figment failures are mapped onto [`ConfigError`] with the offending key
//! located in its TOML file (or named by its `TANDEM_*` variable) and, for
//! typos, the closest valid key. Semantic checks in [`crate::validation`]
//! produce the remaining variants.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::{ENV_PREFIX, SECTIONS};

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key or section tandem does not know.
    #[error("unknown configuration key `{key}` in {origin}")]
    #[diagnostic(
        code(tandem::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// File path or environment variable the key came from.
        origin: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a tandem setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(tandem::config::invalid_type), help("`{key}` expects {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(tandem::config::missing_key),
        help("add `{key} = <value>` to tandem.toml")
    )]
    MissingKey { key: String },

    /// A scheduling field outside its clock range.
    #[error("`{key}` is {value}, outside {range}")]
    #[diagnostic(code(tandem::config::out_of_range))]
    OutOfRange {
        key: String,
        value: u32,
        range: &'static str,
    },

    /// Pings must arrive before the pong deadline expires.
    #[error(
        "chat.ping_interval_secs ({ping_secs}) must be positive and shorter than chat.pong_wait_secs ({pong_wait_secs})"
    )]
    #[diagnostic(
        code(tandem::config::heartbeat),
        help(
            "clients silent for chat.pong_wait_secs are dropped; try ping_interval_secs = {}",
            suggested_ping(pong_wait_secs)
        )
    )]
    HeartbeatOrder { ping_secs: u64, pong_wait_secs: u64 },

    /// A redis backend was selected without a connection URL.
    #[error("bus.redis_url is required when {selected} is redis")]
    #[diagnostic(
        code(tandem::config::redis_url),
        help("set bus.redis_url (or TANDEM_BUS_REDIS_URL), e.g. redis://localhost:6379")
    )]
    MissingRedisUrl { selected: &'static str },

    #[error("validation error: {message}")]
    #[diagnostic(code(tandem::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(tandem::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Nine tenths of the pong deadline, at least one second.
fn suggested_ping(pong_wait_secs: &u64) -> u64 {
    (pong_wait_secs * 9 / 10).max(1)
}

/// Where a failing value was read from.
enum Origin {
    File(String),
    Env,
    Other,
}

fn origin_of(error: &figment::Error) -> Origin {
    let Some(metadata) = error.metadata.as_ref() else {
        return Origin::Other;
    };
    match &metadata.source {
        Some(figment::Source::File(path)) => Origin::File(path.display().to_string()),
        _ if metadata.name.contains(ENV_PREFIX) => Origin::Env,
        _ => Origin::Other,
    }
}

/// The `TANDEM_*` variable that sets the key at `path`.
fn env_var_name(path: &[String]) -> String {
    format!("{ENV_PREFIX}{}", path.join("_").to_ascii_uppercase())
}

/// Convert a figment error (which may hold several) into diagnostics.
///
/// `toml_sources` pairs each file path with its contents so spans can be
/// attached to keys read from files.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                // The path ends with the unknown key itself.
                let section = error.path.split_last().map_or(&[][..], |(_, rest)| rest);
                // Top-level keys can only be sections.
                let vocabulary: Vec<&str> = if section.is_empty() {
                    SECTIONS.to_vec()
                } else {
                    expected.to_vec()
                };
                let (origin, span, src) = match origin_of(&error) {
                    Origin::Env => (env_var_name(&error.path), None, None),
                    Origin::File(path) => {
                        let (span, src) = locate(&path, section, field, toml_sources);
                        (path, span, src)
                    }
                    Origin::Other => ("configuration".to_string(), None, None),
                };
                ConfigError::UnknownKey {
                    key: field.clone(),
                    origin,
                    suggestion: suggest_key(field, &vocabulary),
                    valid_keys: vocabulary.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: dotted(&error.path, field),
            },
            Kind::InvalidType(actual, expected) => {
                let (span, src) = match (origin_of(&error), error.path.split_last()) {
                    (Origin::File(path), Some((key, section))) => {
                        locate(&path, section, key, toml_sources)
                    }
                    _ => (None, None),
                };
                ConfigError::InvalidType {
                    key: error.path.join("."),
                    found: actual.to_string(),
                    expected: expected.clone(),
                    span,
                    src,
                }
            }
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted(path: &[String], key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{key}", path.join("."))
    }
}

fn locate(
    file: &str,
    section: &[String],
    key: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    // figment reports files by their resolved absolute path.
    let Some((path, content)) = toml_sources
        .iter()
        .find(|(p, _)| Path::new(file).ends_with(p))
    else {
        return (None, None);
    };
    let section = section.first().map(String::as_str);
    match locate_key(content, section, key) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `key` inside `[section]` (or of the `[key]` header itself
/// when `section` is `None`). Only the named section is searched.
pub fn locate_key(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let body = line.trim_start();
        let indent = line.len() - body.len();
        if let Some(header) = body
            .trim_end()
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
        {
            let header = header.trim();
            if section.is_none() && header == key {
                return line.find(key).map(|at| offset + at);
            }
            current = Some(header);
        } else if current == section
            && let Some((name, _)) = body.split_once('=')
            && name.trim_end() == key
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Closest key in `valid_keys` by Jaro-Winkler similarity, if any is close
/// enough to be a plausible typo.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typos_suggest_the_nearest_key() {
        let chat = &["send_queue_capacity", "read_limit_bytes", "pong_wait_secs"];
        assert_eq!(
            suggest_key("send_queue_capcity", chat),
            Some("send_queue_capacity".to_string())
        );
        assert_eq!(suggest_key("sever", SECTIONS), Some("server".to_string()));
        assert_eq!(suggest_key("zzzzzz", SECTIONS), None);
    }

    #[test]
    fn keys_are_located_within_their_own_section() {
        let content = "[server]\nport = 1\n\n[chat]\n  port=2\nread_limt = 10\n";
        let at = locate_key(content, Some("chat"), "port").unwrap();
        assert_eq!(&content[at..at + 6], "port=2");
        let at = locate_key(content, Some("chat"), "read_limt").unwrap();
        assert_eq!(&content[at..at + 9], "read_limt");
        assert_eq!(locate_key(content, Some("bus"), "port"), None);
    }

    #[test]
    fn unknown_sections_point_at_the_header() {
        let content = "[server]\nport = 1\n[telemetry]\nenabled = true\n";
        let at = locate_key(content, None, "telemetry").unwrap();
        assert_eq!(&content[at..at + 9], "telemetry");
    }

    #[test]
    fn env_var_names_follow_the_key_path() {
        let path = vec!["chat".to_string(), "pong_wiat_secs".to_string()];
        assert_eq!(env_var_name(&path), "TANDEM_CHAT_PONG_WIAT_SECS");
        assert_eq!(env_var_name(&["metrics".to_string()]), "TANDEM_METRICS");
    }

    #[test]
    fn heartbeat_help_suggests_a_shorter_ping() {
        assert_eq!(suggested_ping(&60), 54);
        assert_eq!(suggested_ping(&1), 1);
    }
}
