// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engagement scoring engine.
//!
//! Records behavior events during chats and, once a session ends, folds them
//! into a bounded per-user score that the matcher uses as a pairing signal.

pub mod delta;
pub mod engine;

pub use delta::{DeltaBreakdown, clamp_score, next_reply_average, session_delta};
pub use engine::ScoringEngine;
