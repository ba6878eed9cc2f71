// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete service stack: temp SQLite database,
//! seeded users, in-process bus, deterministic matcher, hub, and gateway
//! state. `start_server()` serves it on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;
use tokio_util::sync::CancellationToken;

use tandem_bus::LocalBus;
use tandem_config::TandemConfig;
use tandem_config::model::StorageConfig;
use tandem_core::{ChatStore, Location, TandemError, UserId};
use tandem_gateway::{AuthConfig, ChatService, ChatSettings, GatewayState, Hub, ServerConfig};
use tandem_matching::{DailyScheduler, FixedJitter, MatchEngine};
use tandem_scoring::ScoringEngine;
use tandem_storage::{SqliteMarkers, SqliteStore};

struct SeedUser {
    id: UserId,
    name: String,
    location: Option<Location>,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    users: Vec<SeedUser>,
    jitter: f64,
    instance_id: String,
    settings: ChatSettings,
    bearer_token: Option<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            users: Vec::new(),
            jitter: 0.0,
            instance_id: "hub-test-a".to_string(),
            settings: ChatSettings::default(),
            bearer_token: None,
        }
    }

    /// Seed a user with a location.
    pub fn with_user(mut self, id: &str, name: &str, lat: f64, lon: f64) -> Self {
        self.users.push(SeedUser {
            id: id.into(),
            name: name.to_string(),
            location: Some(Location { lat, lon }),
        });
        self
    }

    /// Seed a user who has not shared a location.
    pub fn with_unlocated_user(mut self, id: &str, name: &str) -> Self {
        self.users.push(SeedUser {
            id: id.into(),
            name: name.to_string(),
            location: None,
        });
        self
    }

    /// Fixed jitter value used for every priority evaluation.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_instance_id(mut self, instance_id: &str) -> Self {
        self.instance_id = instance_id.to_string();
        self
    }

    pub fn with_chat_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Require the proxy bearer token on API routes.
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, TandemError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TandemError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("tandem.db");

        let mut config = TandemConfig::default();
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };
        config.server.instance_id = Some(self.instance_id.clone());
        config.server.bearer_token = self.bearer_token.clone();

        let store = SqliteStore::open(&config.storage).await?;
        for user in &self.users {
            store.upsert_user(&user.id, &user.name).await?;
            if let Some(location) = user.location {
                store.set_location(&user.id, location).await?;
            }
        }
        let markers = store.markers();
        let shared: Arc<dyn ChatStore> = Arc::new(store.clone());

        let matcher = Arc::new(MatchEngine::new(
            shared.clone(),
            Arc::new(markers.clone()),
            Arc::new(FixedJitter(self.jitter)),
        ));
        let wiring = Wiring {
            scoring: ScoringEngine::new(shared),
            store,
            bus: LocalBus::default(),
            matcher,
            auth: AuthConfig {
                bearer_token: self.bearer_token,
            },
            settings: self.settings,
            reply_window: Duration::from_secs(config.chat.reply_window_secs),
            cancel: CancellationToken::new(),
        };
        let primary = wiring.instance(&self.instance_id).await?;

        Ok(TestHarness {
            config,
            markers,
            wiring,
            primary,
            _temp_dir: temp_dir,
        })
    }
}

struct Wiring {
    store: SqliteStore,
    bus: LocalBus,
    matcher: Arc<MatchEngine>,
    scoring: ScoringEngine,
    auth: AuthConfig,
    settings: ChatSettings,
    reply_window: Duration,
    cancel: CancellationToken,
}

impl Wiring {
    async fn instance(&self, instance_id: &str) -> Result<GatewayState, TandemError> {
        let shared: Arc<dyn ChatStore> = Arc::new(self.store.clone());
        let (hub, _task) =
            Hub::spawn(instance_id, Arc::new(self.bus.clone()), self.cancel.child_token()).await?;
        let chat = ChatService::new(shared.clone(), self.scoring.clone(), hub, self.reply_window);
        Ok(GatewayState {
            store: shared,
            matcher: self.matcher.clone(),
            scoring: self.scoring.clone(),
            chat,
            auth: self.auth.clone(),
            settings: self.settings,
            start_time: Instant::now(),
        })
    }
}

/// A complete test environment with temp storage and an in-process bus.
pub struct TestHarness {
    /// Configuration the stack was built from.
    pub config: TandemConfig,
    /// Daily markers sharing the store's database.
    pub markers: SqliteMarkers,
    wiring: Wiring,
    primary: GatewayState,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// SQLite store (temp DB, cleaned up on drop).
    pub fn store(&self) -> &SqliteStore {
        &self.wiring.store
    }

    /// Bus shared by every instance spawned from this harness.
    pub fn bus(&self) -> &LocalBus {
        &self.wiring.bus
    }

    pub fn matcher(&self) -> &Arc<MatchEngine> {
        &self.wiring.matcher
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.wiring.scoring
    }

    /// Gateway state of the primary instance.
    pub fn state(&self) -> GatewayState {
        self.primary.clone()
    }

    /// Build another instance with its own hub, sharing the store and bus.
    pub async fn instance(&self, instance_id: &str) -> Result<GatewayState, TandemError> {
        self.wiring.instance(instance_id).await
    }

    /// Serve `state` on an ephemeral local port until the harness is dropped.
    pub async fn serve(&self, state: GatewayState) -> Result<SocketAddr, TandemError> {
        let listener = tandem_gateway::bind(&ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        })
        .await?;
        let addr = listener.local_addr().map_err(|e| TandemError::Channel {
            message: format!("listener has no local address: {e}"),
            source: Some(Box::new(e)),
        })?;
        let cancel = self.wiring.cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = tandem_gateway::serve(listener, state, cancel).await {
                tracing::warn!(error = %e, "test server stopped");
            }
        });
        Ok(addr)
    }

    /// Serve the primary instance.
    pub async fn start_server(&self) -> Result<SocketAddr, TandemError> {
        self.serve(self.state()).await
    }

    /// A scheduler wired to this harness. Batch runs at 20:00, cleanup at midnight.
    pub fn scheduler(&self) -> DailyScheduler {
        let shared: Arc<dyn ChatStore> = Arc::new(self.wiring.store.clone());
        DailyScheduler::new(
            self.wiring.matcher.clone(),
            self.wiring.scoring.clone(),
            shared,
            Arc::new(self.markers.clone()),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::MIN,
        )
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.wiring.cancel.cancel();
    }
}
