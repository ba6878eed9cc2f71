// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod events;
pub mod markers;
pub mod messages;
pub mod scores;
pub mod sessions;
pub mod users;

use std::str::FromStr;

/// Parse a text column into a strum enum, reporting failures as conversion
/// errors for that column.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
