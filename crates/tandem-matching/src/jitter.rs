// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Random tie-break source for pairing priority.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

/// Supplies jitter values in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn next(&self) -> f64;
}

/// Uniform draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn next(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

/// Always returns the same value. Makes selection depend only on distance
/// and score.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn next(&self) -> f64 {
        self.0
    }
}

/// Replays a scripted sequence, then falls back to `0.0`.
#[derive(Debug, Default)]
pub struct SequenceJitter {
    values: Mutex<VecDeque<f64>>,
}

impl SequenceJitter {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }
}

impl JitterSource for SequenceJitter {
    fn next(&self) -> f64 {
        match self.values.lock() {
            Ok(mut values) => values.pop_front().unwrap_or(0.0),
            Err(poisoned) => poisoned.into_inner().pop_front().unwrap_or(0.0),
        }
    }
}
