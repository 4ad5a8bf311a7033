// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Reference store over a key/value storage driver
//!
//! Snapshots live in one tree. A key is the scope's byte length (big-endian
//! u32), the scope, then the session id, so no scope's key range contains
//! another's even when scopes nest (`/shop` and `/shop/admin`). Several
//! stores with different scopes may be opened over the same tree.

use super::persistent::{StorageTree, StoreError, StoreResult};
use super::store::Store;
use crate::session::snapshot::SessionSnapshot;
use std::sync::Arc;

/// Tree name used by [`DriverStore::open`]
pub const SESSION_TREE: &str = "sessions";

/// [`Store`] implementation backed by a [`StorageTree`]
pub struct DriverStore {
    tree: Arc<dyn StorageTree>,
    scope: String,
    prefix: Vec<u8>,
}

impl DriverStore {
    /// Bind a tree to a scope
    pub fn new(tree: Arc<dyn StorageTree>, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let mut prefix = Vec::with_capacity(4 + scope.len());
        prefix.extend_from_slice(&(scope.len() as u32).to_be_bytes());
        prefix.extend_from_slice(scope.as_bytes());
        Self {
            tree,
            scope,
            prefix,
        }
    }

    /// Open the shared session tree of a driver and bind it to a scope
    pub fn open<D>(driver: &D, scope: impl Into<String>) -> StoreResult<Self>
    where
        D: super::persistent::StorageDriver<Tree = Box<dyn StorageTree>> + ?Sized,
    {
        let tree: Arc<dyn StorageTree> = Arc::from(driver.open_tree(SESSION_TREE)?);
        Ok(Self::new(tree, scope))
    }

    fn key(&self, id: &str) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn id_from_key(&self, key: &[u8]) -> StoreResult<String> {
        let raw = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or_else(|| StoreError::InvalidKey(String::from_utf8_lossy(key).to_string()))?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| StoreError::InvalidKey(String::from_utf8_lossy(key).to_string()))
    }

    /// Flush pending writes to the backend
    pub fn flush(&self) -> StoreResult<()> {
        self.tree.flush()
    }
}

impl Store for DriverStore {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.tree
            .scan_prefix(&self.prefix)?
            .map(|entry| entry.and_then(|(key, _)| self.id_from_key(&key)))
            .collect()
    }

    fn load(&self, id: &str) -> StoreResult<Option<SessionSnapshot>> {
        match self.tree.get(&self.key(id))? {
            Some(bytes) => SessionSnapshot::decode(&bytes)
                .map(Some)
                .map_err(|e| StoreError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &SessionSnapshot) -> StoreResult<()> {
        let bytes = snapshot
            .encode()
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.tree.insert(&self.key(&snapshot.id), &bytes)
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        self.tree.remove(&self.key(id))
    }

    fn clear(&self) -> StoreResult<()> {
        let keys: Vec<Vec<u8>> = self
            .tree
            .scan_prefix(&self.prefix)?
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<StoreResult<_>>()?;
        let refs: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
        self.tree.batch_remove(&refs)
    }
}

impl std::fmt::Debug for DriverStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverStore")
            .field("scope", &self.scope)
            .finish()
    }
}
