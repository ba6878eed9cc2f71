// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`ChatStore`] and [`MarkerStore`] traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use tandem_config::model::StorageConfig;
use tandem_core::{
    AdapterType, BehaviorEvent, Candidate, ChatSession, ChatStore, EngagementRecord, HealthStatus,
    Location, MarkerStore, Message, PluginAdapter, ScoreUpdate, SessionActivity, SessionId,
    SessionStatus, TandemError, User, UserId,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed store. Delegates every operation to the query modules.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Wrap an already opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, TandemError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite store initialized");
        Ok(Self::new(db))
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TandemError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TandemError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn upsert_user(&self, id: &UserId, display_name: &str) -> Result<(), TandemError> {
        queries::users::upsert_user(&self.db, id, display_name).await
    }

    async fn set_location(&self, id: &UserId, location: Location) -> Result<(), TandemError> {
        queries::users::set_location(&self.db, id, location).await
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, TandemError> {
        queries::users::get_user(&self.db, id).await
    }

    async fn list_unmatched_users(&self, day: NaiveDate) -> Result<Vec<Candidate>, TandemError> {
        queries::users::list_unmatched_users(&self.db, day).await
    }

    async fn create_session(
        &self,
        user1: &UserId,
        user2: &UserId,
    ) -> Result<ChatSession, TandemError> {
        queries::sessions::create_session(&self.db, user1, user2).await
    }

    async fn discard_session(&self, id: &SessionId) -> Result<(), TandemError> {
        queries::sessions::discard_session(&self.db, id).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, TandemError> {
        queries::sessions::get_session(&self.db, id).await
    }

    async fn session_started_on(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<ChatSession>, TandemError> {
        queries::sessions::session_started_on(&self.db, user, day).await
    }

    async fn end_session(
        &self,
        id: &SessionId,
        status: SessionStatus,
        ended_by: Option<&UserId>,
    ) -> Result<bool, TandemError> {
        queries::sessions::end_session(&self.db, id, status, ended_by).await
    }

    async fn end_all_active(&self) -> Result<Vec<ChatSession>, TandemError> {
        queries::sessions::end_all_active(&self.db).await
    }

    async fn sessions_ended_on(&self, day: NaiveDate) -> Result<Vec<ChatSession>, TandemError> {
        queries::sessions::sessions_ended_on(&self.db, day).await
    }

    async fn insert_message(&self, message: &Message) -> Result<(), TandemError> {
        queries::messages::insert_message(&self.db, message).await
    }

    async fn get_messages(&self, session: &SessionId) -> Result<Vec<Message>, TandemError> {
        queries::messages::get_messages(&self.db, session).await
    }

    async fn count_messages(
        &self,
        session: &SessionId,
        sender: &UserId,
    ) -> Result<u32, TandemError> {
        queries::messages::count_messages(&self.db, session, sender).await
    }

    async fn last_message_from_other(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<Message>, TandemError> {
        queries::messages::last_message_from_other(&self.db, session, user).await
    }

    async fn insert_event(&self, event: &BehaviorEvent) -> Result<(), TandemError> {
        queries::events::insert_event(&self.db, event).await
    }

    async fn session_event_summary(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<SessionActivity, TandemError> {
        queries::events::session_event_summary(&self.db, user, session).await
    }

    async fn get_engagement(
        &self,
        user: &UserId,
    ) -> Result<Option<EngagementRecord>, TandemError> {
        queries::scores::get_engagement(&self.db, user).await
    }

    async fn apply_score_update(
        &self,
        update: &ScoreUpdate,
    ) -> Result<Option<f64>, TandemError> {
        queries::scores::apply_score_update(&self.db, update).await
    }
}

/// Daily markers in the `daily_markers` table of the same database.
#[derive(Clone)]
pub struct SqliteMarkers {
    db: Database,
}

impl SqliteMarkers {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SqliteStore {
    /// A marker store sharing this store's connection.
    pub fn markers(&self) -> SqliteMarkers {
        SqliteMarkers::new(self.db.clone())
    }
}

#[async_trait]
impl PluginAdapter for SqliteMarkers {
    fn name(&self) -> &str {
        "sqlite-markers"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Markers
    }

    async fn health_check(&self) -> Result<HealthStatus, TandemError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TandemError> {
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for SqliteMarkers {
    async fn try_mark(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
        ttl: Duration,
    ) -> Result<bool, TandemError> {
        queries::markers::try_mark(&self.db, user, day, session, ttl).await
    }

    async fn get_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<SessionId>, TandemError> {
        queries::markers::get_marker(&self.db, user, day).await
    }

    async fn clear_marker(
        &self,
        user: &UserId,
        day: NaiveDate,
        session: &SessionId,
    ) -> Result<(), TandemError> {
        queries::markers::clear_marker(&self.db, user, day, session).await
    }

    async fn purge_expired(&self) -> Result<u64, TandemError> {
        queries::markers::purge_expired(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_core::clock::today;

    async fn open_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("store.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        (SqliteStore::open(&config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn health_and_shutdown() {
        let (store, _dir) = open_store().await;
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(store.adapter_type(), AdapterType::Storage);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn usable_through_trait_objects() {
        let (store, _dir) = open_store().await;
        let chat: Arc<dyn ChatStore> = Arc::new(store.clone());
        let markers: Arc<dyn MarkerStore> = Arc::new(store.markers());

        chat.upsert_user(&"a".into(), "Ann").await.unwrap();
        chat.upsert_user(&"b".into(), "Bob").await.unwrap();
        let session = chat.create_session(&"a".into(), &"b".into()).await.unwrap();

        let won = markers
            .try_mark(&"a".into(), today(), &session.id, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(won);
        assert_eq!(markers.adapter_type(), AdapterType::Markers);
    }
}
