// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled storage driver implementation

use super::traits::{KvIter, StorageDriver, StorageTree};
use super::types::{StorageType, StoreError, StoreResult};
use std::path::Path;

fn backend(e: sled::Error) -> StoreError {
    StoreError::BackendSpecific(e.to_string())
}

/// Sled driver implementation
pub struct SledDriver {
    db: sled::Db,
}

/// Sled tree wrapper that implements StorageTree trait
pub struct SledTree {
    tree: sled::Tree,
}

impl StorageTree for SledTree {
    fn insert(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tree.insert(key, value).map_err(backend)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.tree
            .get(key)
            .map_err(backend)
            .map(|opt| opt.map(|v| v.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> StoreResult<()> {
        self.tree.remove(key).map_err(backend)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>> {
        let iter = self.tree.scan_prefix(prefix).map(|result| {
            result
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(backend)
        });
        Ok(Box::new(iter))
    }

    fn batch_remove(&self, keys: &[&[u8]]) -> StoreResult<()> {
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(*key);
        }
        self.tree.apply_batch(batch).map_err(backend)
    }

    fn flush(&self) -> StoreResult<()> {
        self.tree.flush().map_err(backend)?;
        Ok(())
    }
}

impl StorageDriver for SledDriver {
    type Tree = Box<dyn StorageTree>;

    fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path).map_err(backend)?;
        Ok(SledDriver { db })
    }

    fn open_tree(&self, name: &str) -> StoreResult<Self::Tree> {
        let tree = self.db.open_tree(name).map_err(backend)?;
        Ok(Box::new(SledTree { tree }) as Box<dyn StorageTree>)
    }

    fn list_trees(&self) -> StoreResult<Vec<String>> {
        let tree_names = self
            .db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).to_string())
            .collect();
        Ok(tree_names)
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Sled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sled_tree_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let driver = SledDriver::open(temp_dir.path()).unwrap();
        let tree = driver.open_tree("sessions").unwrap();

        tree.insert(b"app/1", b"payload").unwrap();
        assert_eq!(tree.get(b"app/1").unwrap(), Some(b"payload".to_vec()));

        tree.batch_remove(&[b"app/1".as_slice()]).unwrap();
        assert!(tree.get(b"app/1").unwrap().is_none());
        assert!(driver.list_trees().unwrap().contains(&"sessions".to_string()));
    }
}
