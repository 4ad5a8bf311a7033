// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver factory
//!
//! This module provides factory functions for creating storage drivers based on configuration.

use super::traits::{StorageDriver, StorageTree};
use super::types::{StorageType, StoreResult};
use std::path::Path;

/// Boxed driver handed to session stores
pub type BoxedDriver = Box<dyn StorageDriver<Tree = Box<dyn StorageTree>>>;

/// Factory function to create a storage driver based on configuration
///
/// # Arguments
/// * `storage_type` - The type of storage driver to create
/// * `path` - The filesystem path where the database should be stored
///   (ignored by the memory driver)
///
/// # Examples
/// ```ignore
/// let driver = create_storage_driver(StorageType::Sled, "./sessions")?;
/// let store = DriverStore::new(driver.open_tree("sessions")?, "/shop");
/// ```
pub fn create_storage_driver<P: AsRef<Path>>(
    storage_type: StorageType,
    path: P,
) -> StoreResult<BoxedDriver> {
    match storage_type {
        #[cfg(feature = "sled-backend")]
        StorageType::Sled => {
            use crate::storage::persistent::sled::SledDriver;
            let driver = SledDriver::open(path)?;
            Ok(Box::new(driver) as BoxedDriver)
        }
        #[cfg(not(feature = "sled-backend"))]
        StorageType::Sled => {
            let _ = path;
            Err(super::types::StoreError::BackendSpecific(
                "Sled storage backend not compiled in (enable the `sled-backend` feature)"
                    .to_string(),
            ))
        }
        StorageType::Memory => {
            use crate::storage::persistent::memory::MemoryStorageDriver;
            let driver = MemoryStorageDriver::open(path)?;
            Ok(Box::new(driver) as BoxedDriver)
        }
    }
}
