// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Durable session store contract
//!
//! A store keeps serialized snapshots of sessions outside process memory. Each
//! store instance is bound to one scope (the owning registry's name), so any
//! number of registries can share one physical backend.

use crate::session::snapshot::SessionSnapshot;
use crate::storage::persistent::StoreResult;
use chrono::{DateTime, Utc};

/// Pluggable durable storage for session snapshots
///
/// Implementations must tolerate concurrent calls; they own their
/// connections and may pool them.
pub trait Store: Send + Sync {
    /// Scope this store is bound to
    fn scope(&self) -> &str;

    /// Ids of every snapshot held for this scope
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Number of snapshots held for this scope
    fn size(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }

    /// Load a snapshot; a missing id is `Ok(None)`, not an error
    fn load(&self, id: &str) -> StoreResult<Option<SessionSnapshot>>;

    /// Save a snapshot, overwriting any previous one with the same id
    fn save(&self, snapshot: &SessionSnapshot) -> StoreResult<()>;

    /// Remove a snapshot; removing a missing id succeeds
    fn remove(&self, id: &str) -> StoreResult<()>;

    /// Remove every snapshot for this scope
    fn clear(&self) -> StoreResult<()>;

    /// Purge snapshots whose own timeout has elapsed. Returns how many were
    /// removed. Per-key failures are logged and skipped.
    ///
    /// Removes bytes only; a manager's sweep uses
    /// `SessionManager::process_store_expires` so listeners see the expiry.
    fn process_expires(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut expired = 0;
        for id in self.keys()? {
            match self.load(&id) {
                Ok(Some(snapshot)) if snapshot.is_stale_at(now) => match self.remove(&id) {
                    Ok(()) => expired += 1,
                    Err(e) => log::warn!("Failed to purge stale snapshot {}: {}", id, e),
                },
                Ok(_) => {}
                Err(e) => log::warn!("Failed to inspect stored snapshot {}: {}", id, e),
            }
        }
        Ok(expired)
    }
}
