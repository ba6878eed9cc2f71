// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tandem serve` and the one-shot operator commands.
//!
//! Wires the store, marker store, bus, matcher, scoring engine, hub,
//! scheduler, and gateway together from a validated [`TandemConfig`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;
use tracing::{debug, info, warn};

use tandem_bus::LocalBus;
use tandem_config::model::ChatConfig;
use tandem_config::{BusBackend, MarkerBackend, TandemConfig};
use tandem_core::{ChatStore, HealthStatus, MarkerStore, MessageBus, PluginAdapter, TandemError};
use tandem_gateway::{AuthConfig, ChatService, ChatSettings, GatewayState, Hub, ServerConfig};
use tandem_matching::{BatchReport, CleanupReport, DailyScheduler, MatchEngine, ThreadRngJitter};
use tandem_scoring::ScoringEngine;
use tandem_storage::SqliteStore;

use crate::shutdown;

/// Crates whose log level follows `server.log_level`.
const LOG_TARGETS: &[&str] = &[
    "tandem",
    "tandem_bus",
    "tandem_config",
    "tandem_core",
    "tandem_gateway",
    "tandem_matching",
    "tandem_scoring",
    "tandem_storage",
];

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn default_directive(log_level: &str) -> String {
    let mut directive = String::from("warn");
    for target in LOG_TARGETS {
        directive.push_str(&format!(",{target}={log_level}"));
    }
    directive
}

/// Map the chat config section onto gateway connection limits.
pub fn chat_settings(config: &ChatConfig) -> ChatSettings {
    ChatSettings {
        send_queue_capacity: config.send_queue_capacity,
        read_limit_bytes: config.read_limit_bytes,
        pong_wait: Duration::from_secs(config.pong_wait_secs),
        ping_interval: Duration::from_secs(config.ping_interval_secs),
        write_wait: Duration::from_secs(config.write_wait_secs),
    }
}

/// The configured bus identity, or a fresh random one.
pub fn instance_id(config: &TandemConfig) -> String {
    config
        .server
        .instance_id
        .clone()
        .unwrap_or_else(|| format!("hub-{}", uuid::Uuid::new_v4()))
}

fn wall_clock(hour: u32, minute: u32) -> Result<NaiveTime, TandemError> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| TandemError::Config(format!("invalid time of day {hour:02}:{minute:02}")))
}

#[cfg(feature = "redis")]
fn redis_url(config: &TandemConfig) -> Result<&str, TandemError> {
    config
        .bus
        .redis_url
        .as_deref()
        .ok_or_else(|| TandemError::Config("bus.redis_url is required for redis".into()))
}

#[cfg(not(feature = "redis"))]
fn redis_unavailable() -> TandemError {
    TandemError::Config("this build has no redis support; rebuild with the `redis` feature".into())
}

/// Long-lived services shared by every command.
pub struct Stack {
    pub shared: Arc<dyn ChatStore>,
    pub markers: Arc<dyn MarkerStore>,
    pub bus: Arc<dyn MessageBus>,
    pub matcher: Arc<MatchEngine>,
    pub scoring: ScoringEngine,
}

impl Stack {
    /// Open the store and connect the configured backends.
    pub async fn open(config: &TandemConfig) -> Result<Self, TandemError> {
        let store = SqliteStore::open(&config.storage).await?;
        let shared: Arc<dyn ChatStore> = Arc::new(store.clone());
        let markers = open_markers(config, &store).await?;
        let bus = open_bus(config).await?;

        let matcher = Arc::new(MatchEngine::new(
            shared.clone(),
            markers.clone(),
            Arc::new(ThreadRngJitter),
        ));
        let scoring = ScoringEngine::new(shared.clone());

        Ok(Self {
            shared,
            markers,
            bus,
            matcher,
            scoring,
        })
    }

    pub fn scheduler(&self, config: &TandemConfig) -> Result<DailyScheduler, TandemError> {
        let m = &config.matching;
        Ok(DailyScheduler::new(
            self.matcher.clone(),
            self.scoring.clone(),
            self.shared.clone(),
            self.markers.clone(),
            wall_clock(m.batch_hour, m.batch_minute)?,
            wall_clock(m.cleanup_hour, m.cleanup_minute)?,
        ))
    }

    async fn report_health(&self) {
        report_adapter(self.shared.as_ref()).await;
        report_adapter(self.markers.as_ref()).await;
        report_adapter(self.bus.as_ref()).await;
    }

    /// Release backend resources. Failures are logged.
    pub async fn shutdown(&self) {
        shutdown_adapter(self.bus.as_ref()).await;
        shutdown_adapter(self.markers.as_ref()).await;
        shutdown_adapter(self.shared.as_ref()).await;
    }
}

async fn report_adapter<A: PluginAdapter + ?Sized>(adapter: &A) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => {
            debug!(adapter = adapter.name(), kind = %adapter.adapter_type(), "adapter healthy");
        }
        Ok(status) => warn!(adapter = adapter.name(), ?status, "adapter not healthy"),
        Err(e) => warn!(adapter = adapter.name(), error = %e, "adapter health check failed"),
    }
}

async fn shutdown_adapter<A: PluginAdapter + ?Sized>(adapter: &A) {
    if let Err(e) = adapter.shutdown().await {
        warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
    }
}

async fn open_markers(
    config: &TandemConfig,
    store: &SqliteStore,
) -> Result<Arc<dyn MarkerStore>, TandemError> {
    match config.bus.markers {
        MarkerBackend::Sqlite => Ok(Arc::new(store.markers())),
        #[cfg(feature = "redis")]
        MarkerBackend::Redis => Ok(Arc::new(
            tandem_bus::RedisMarkerStore::connect(redis_url(config)?).await?,
        )),
        #[cfg(not(feature = "redis"))]
        MarkerBackend::Redis => Err(redis_unavailable()),
    }
}

async fn open_bus(config: &TandemConfig) -> Result<Arc<dyn MessageBus>, TandemError> {
    match config.bus.backend {
        BusBackend::Local => Ok(Arc::new(LocalBus::default())),
        #[cfg(feature = "redis")]
        BusBackend::Redis => Ok(Arc::new(
            tandem_bus::RedisBus::connect(redis_url(config)?, config.bus.channel.clone()).await?,
        )),
        #[cfg(not(feature = "redis"))]
        BusBackend::Redis => Err(redis_unavailable()),
    }
}

/// Run the service until SIGINT or SIGTERM.
pub async fn run_serve(config: TandemConfig) -> Result<(), TandemError> {
    info!("starting tandem serve");

    let cancel = shutdown::install_signal_handler();
    let stack = Stack::open(&config).await?;
    stack.report_health().await;

    let instance_id = instance_id(&config);
    let (hub, hub_task) = Hub::spawn(instance_id, stack.bus.clone(), cancel.clone()).await?;
    let chat = ChatService::new(
        stack.shared.clone(),
        stack.scoring.clone(),
        hub,
        Duration::from_secs(config.chat.reply_window_secs),
    );

    let state = GatewayState {
        store: stack.shared.clone(),
        matcher: stack.matcher.clone(),
        scoring: stack.scoring.clone(),
        chat,
        auth: AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
        settings: chat_settings(&config.chat),
        start_time: Instant::now(),
    };

    let scheduler = stack.scheduler(&config)?;
    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let listener = tandem_gateway::bind(&ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    })
    .await?;
    let result = tandem_gateway::serve(listener, state, cancel.clone()).await;

    // Stop the hub and scheduler even when the server failed.
    cancel.cancel();
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    if let Err(e) = hub_task.await {
        warn!(error = %e, "hub task ended abnormally");
    }
    stack.shutdown().await;

    info!("tandem stopped");
    result
}

/// One batch-matching pass.
pub async fn run_match(config: TandemConfig) -> Result<BatchReport, TandemError> {
    let stack = Stack::open(&config).await?;
    let report = stack.matcher.run_batch_matching().await;
    stack.shutdown().await;
    report
}

/// One midnight-cleanup pass.
pub async fn run_cleanup(config: TandemConfig) -> Result<CleanupReport, TandemError> {
    let stack = Stack::open(&config).await?;
    let report = stack.scheduler(&config)?.midnight_cleanup().await;
    stack.shutdown().await;
    report
}

/// Recompute scores for sessions that ended on `day`.
pub async fn run_rescore(config: TandemConfig, day: chrono::NaiveDate) -> Result<usize, TandemError> {
    let stack = Stack::open(&config).await?;
    let processed = stack.scoring.scheduled_score_update(day).await;
    stack.shutdown().await;
    Ok(processed)
}
