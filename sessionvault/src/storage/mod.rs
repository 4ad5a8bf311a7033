// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable storage for swapped-out and backed-up sessions
//!
//! - [`Store`]: the pluggable contract the session manager talks to
//! - [`DriverStore`]: reference implementation over a key/value driver
//! - [`persistent`]: the drivers themselves (Sled, in-memory)

pub mod driver_store;
pub mod persistent;
pub mod store;

pub use driver_store::{DriverStore, SESSION_TREE};
pub use persistent::{
    create_storage_driver, MemoryStorageDriver, StorageDriver, StorageTree, StorageType,
    StoreError, StoreResult,
};
#[cfg(feature = "sled-backend")]
pub use persistent::SledDriver;
pub use store::Store;
