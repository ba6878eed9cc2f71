// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process bus built on a tokio broadcast channel.
//!
//! Like a pub/sub server, it echoes every envelope to every subscriber,
//! including the publishing instance.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use tandem_core::{AdapterType, Envelope, HealthStatus, MessageBus, PluginAdapter, TandemError};

use crate::SUBSCRIBER_CAPACITY;

/// Broadcast-backed bus shared by every hub in the process.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PluginAdapter for LocalBus {
    fn name(&self) -> &str {
        "local"
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
impl MessageBus for LocalBus {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TandemError> {
        // No subscribers is not an error; the envelope simply has no audience.
        if self.tx.send(envelope.clone()).is_err() {
            debug!(session_id = %envelope.session_id, "published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Envelope>, TandemError> {
        let mut rx = self.tx.subscribe();
        let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if out_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus subscriber lagged, envelopes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(out_rx)
    }
}
