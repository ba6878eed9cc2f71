// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily pairing for tandem.
//!
//! Users within [`geo::MAX_DISTANCE_KM`] of each other are paired at most
//! once per local calendar day, either on demand or by the scheduled batch
//! pass. Priority blends proximity, engagement-score similarity, and jitter.

pub mod engine;
pub mod geo;
pub mod jitter;
pub mod scheduler;

pub use engine::{
    BatchReport, DEFAULT_MAX_ATTEMPTS, MatchEngine, MatchResult, PairOutcome, RankedPair,
    ScoredCandidate, rank_pairs, select_best,
};
pub use geo::{MAX_DISTANCE_KM, distance_km, priority, within_range};
pub use jitter::{FixedJitter, JitterSource, SequenceJitter, ThreadRngJitter};
pub use scheduler::{CleanupReport, DailyScheduler, next_occurrence};
