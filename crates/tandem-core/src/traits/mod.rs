// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod bus;
pub mod markers;
pub mod store;

pub use adapter::PluginAdapter;
pub use bus::MessageBus;
pub use markers::{MarkerStore, marker_key};
pub use store::ChatStore;
