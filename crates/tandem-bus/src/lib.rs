// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message bus backends for relaying chat envelopes between instances.
//!
//! [`LocalBus`] fans out inside one process. With the `redis` feature,
//! [`RedisBus`] relays over Redis pub/sub and [`RedisMarkerStore`] keeps
//! daily match markers as expiring Redis keys.

pub mod local;
#[cfg(feature = "redis")]
pub mod redis;

pub use local::LocalBus;
#[cfg(feature = "redis")]
pub use crate::redis::{RedisBus, RedisMarkerStore};

/// Capacity of each subscriber's receive queue.
pub const SUBSCRIBER_CAPACITY: usize = 256;
