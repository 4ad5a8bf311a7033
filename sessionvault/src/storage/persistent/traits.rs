// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver traits
//!
//! A driver is an embedded key/value database; a tree is one named keyspace
//! inside it. Session stores only need point reads and writes, prefix scans
//! for scope listing, and batch removal for clearing a scope.

use super::types::{StorageType, StoreResult};
use std::path::Path;

/// Boxed iterator over raw key/value pairs
pub type KvIter<'a> = Box<dyn Iterator<Item = StoreResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Named keyspace inside a storage driver
pub trait StorageTree: Send + Sync {
    /// Insert a key-value pair, replacing any previous value
    fn insert(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Removing a missing key succeeds
    fn remove(&self, key: &[u8]) -> StoreResult<()>;

    /// Entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>>;

    fn batch_remove(&self, keys: &[&[u8]]) -> StoreResult<()>;

    /// Flush pending writes to disk
    fn flush(&self) -> StoreResult<()>;
}

/// Embedded key/value database backing one or more session stores
pub trait StorageDriver: Send + Sync {
    type Tree: StorageTree;

    /// Open or create a database at the given path
    fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self>
    where
        Self: Sized;

    /// Open or create a named tree
    fn open_tree(&self, name: &str) -> StoreResult<Self::Tree>;

    fn list_trees(&self) -> StoreResult<Vec<String>>;

    fn flush(&self) -> StoreResult<()>;

    fn storage_type(&self) -> StorageType;
}

// Lets drivers hand out boxed trees through the associated type
impl StorageTree for Box<dyn StorageTree> {
    fn insert(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        (**self).insert(key, value)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn remove(&self, key: &[u8]) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>> {
        (**self).scan_prefix(prefix)
    }

    fn batch_remove(&self, keys: &[&[u8]]) -> StoreResult<()> {
        (**self).batch_remove(keys)
    }

    fn flush(&self) -> StoreResult<()> {
        (**self).flush()
    }
}
