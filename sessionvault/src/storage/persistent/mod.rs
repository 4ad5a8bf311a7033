// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent storage backends
//!
//! This module provides trait-based abstractions for persistent key-value storage,
//! allowing different storage backends to sit under a session store interchangeably.
//!
//! # Architecture
//!
//! ```text
//! Store (session snapshots, scoped by registry name)
//!     ↓
//! StorageDriver (key-value abstraction)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```

// Core modules
pub mod factory;
pub mod traits;
pub mod types;

// Driver implementations
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;

// Public API re-exports
pub use factory::{create_storage_driver, BoxedDriver};
pub use memory::MemoryStorageDriver;
#[cfg(feature = "sled-backend")]
pub use self::sled::SledDriver;
pub use traits::{StorageDriver, StorageTree};
pub use types::{StorageType, StoreError, StoreResult};
