// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for tandem integration tests.
//!
//! Provides a mock bus and a test harness for fast, deterministic,
//! CI-runnable tests without Redis.
//!
//! # Components
//!
//! - [`TestHarness`] - full stack over a temp SQLite database
//! - [`MockBus`] - message bus with captured publishes and injectable deliveries

pub mod harness;
pub mod mock_bus;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_bus::MockBus;
