// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-instance message bus trait.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TandemError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Envelope;

/// Publish/subscribe relay for chat envelopes.
///
/// Buses may deliver a published envelope back to the publisher; consumers
/// filter on [`Envelope::origin_instance_id`].
#[async_trait]
pub trait MessageBus: PluginAdapter {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TandemError>;

    /// Opens a subscription. The receiver yields every envelope published
    /// after this call returns, until the bus shuts down.
    async fn subscribe(&self) -> Result<mpsc::Receiver<Envelope>, TandemError>;
}
