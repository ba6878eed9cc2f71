// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily match marker store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::TandemError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{SessionId, UserId};

/// Expiring `(user, day) -> session` keys. A present marker is the
/// authoritative "already matched today" signal across all instances.
#[async_trait]
pub trait MarkerStore: PluginAdapter {
    /// Atomic set-if-absent with expiry. Returns `true` when this call placed
    /// the marker, `false` when a live marker already exists.
    async fn try_mark(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
        ttl: Duration,
    ) -> Result<bool, TandemError>;

    async fn get_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<SessionId>, TandemError>;

    /// Removes the marker only if it still holds `session`.
    async fn clear_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
    ) -> Result<(), TandemError>;

    /// Drops expired markers. Stores with native expiry return `Ok(0)`.
    async fn purge_expired(&self) -> Result<u64, TandemError>;
}

/// Key layout shared by key-value marker stores: `match:<user>:<YYYY-MM-DD>`.
pub fn marker_key(user: &UserId, day: NaiveDate) -> String {
    format!("match:{}:{}", user, day.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(marker_key(&"u-1".into(), day), "match:u-1:2026-03-09");
    }
}
