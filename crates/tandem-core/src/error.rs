// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for tandem.

use thiserror::Error;

/// The primary error type used across all tandem adapter traits and services.
#[derive(Debug, Error)]
pub enum TandemError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent store errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Message bus or marker store errors (publish failure, lost subscription).
    #[error("bus error: {message}")]
    Bus {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection-level errors (bind failure, socket I/O).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The user has no location on file and cannot be matched.
    #[error("user has no location set")]
    NoLocation,

    /// Coordinates outside the valid latitude/longitude ranges.
    #[error("invalid location: lat={lat}, lon={lon}")]
    InvalidLocation { lat: f64, lon: f64 },

    /// No eligible partner within range today.
    #[error("no matches available nearby")]
    NoCandidates,

    /// The referenced user does not exist.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The referenced chat session does not exist (or is not in the required state).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Caller is not a participant of the session.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A concurrent writer kept winning the daily marker race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Whether this error was caused by the caller's input or state, as opposed
    /// to an infrastructure failure. User errors are reported and never retried.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TandemError::NoLocation
                | TandemError::InvalidLocation { .. }
                | TandemError::NoCandidates
                | TandemError::UnknownUser(_)
                | TandemError::SessionNotFound(_)
                | TandemError::Forbidden(_)
                | TandemError::Conflict(_)
        )
    }
}
