// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for tandem.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed queries for users,
//! sessions, messages, behavior events, engagement scores, and daily markers.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::{SqliteMarkers, SqliteStore};
pub use database::{Database, map_tr_err};
