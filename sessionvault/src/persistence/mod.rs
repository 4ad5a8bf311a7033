// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session persistence
//!
//! - [`scheduler`]: the periodic background task driving sweeps
//! - [`swap`]: swap-out, swap-in, backup and restart persistence

pub mod scheduler;
pub mod swap;

pub use scheduler::BackgroundTask;
pub use swap::SweepReport;
