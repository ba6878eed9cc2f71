// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for tandem.
//!
//! This crate provides the error type, domain types, and the adapter traits
//! (persistent store, daily marker store, message bus) that the matching,
//! scoring, and chat crates are written against.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use error::TandemError;
pub use types::{
    AdapterType, BehaviorEvent, Candidate, ChatSession, DEFAULT_SCORE, EngagementRecord, Envelope,
    EventType, HealthStatus, Location, MAX_SCORE, MIN_SCORE, Message, ScoreUpdate, SessionActivity,
    SessionId, SessionStatus, User, UserId,
};

pub use traits::{ChatStore, MarkerStore, MessageBus, PluginAdapter, marker_key};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Storage, AdapterType::Markers, AdapterType::Bus] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Degraded("slow".into()), healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _store(_: &dyn ChatStore) {}
        fn _markers(_: &dyn MarkerStore) {}
        fn _bus(_: &dyn MessageBus) {}
    }
}
