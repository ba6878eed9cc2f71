// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock message bus for deterministic testing.
//!
//! `MockBus` implements `MessageBus` with captured publishes and injectable
//! deliveries. It never echoes, so tests control exactly what a hub sees.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use tandem_core::{AdapterType, Envelope, HealthStatus, MessageBus, PluginAdapter, TandemError};

/// A mock bus for testing.
///
/// - **published**: envelopes passed to `publish()`, retrievable via `published()`
/// - **inject**: envelopes pushed to every current subscriber
#[derive(Clone, Default)]
pub struct MockBus {
    published: Arc<Mutex<Vec<Envelope>>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<Envelope>>>>,
    fail_publish: Arc<std::sync::atomic::AtomicBool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an envelope to every subscriber, as if another instance sent it.
    pub async fn inject(&self, envelope: Envelope) {
        let subscribers = self.subscribers.lock().await;
        for tx in subscribers.iter() {
            let _ = tx.send(envelope.clone()).await;
        }
    }

    /// Everything published so far.
    pub async fn published(&self) -> Vec<Envelope> {
        self.published.lock().await.clone()
    }

    /// Make subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for MockBus {
    fn name(&self) -> &str {
        "mock-bus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bus
    }

    async fn health_check(&self) -> Result<HealthStatus, TandemError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TandemError> {
        Ok(())
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TandemError> {
        if self.fail_publish.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TandemError::Bus {
                message: "mock publish failure".into(),
                source: None,
            });
        }
        self.published.lock().await.push(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Envelope>, TandemError> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().await.push(tx);
        Ok(rx)
    }
}
