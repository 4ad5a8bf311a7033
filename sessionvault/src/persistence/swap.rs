// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Moving sessions between memory and the store
//!
//! The sweeper calls [`SessionManager::background_process`] once per check
//! interval. A sweep expires timed-out sessions, then (with a store wired)
//! swaps out sessions beyond the active ceiling, swaps out long-idle
//! sessions, backs up idle ones, and purges stale snapshots from the store.
//! Store I/O never runs under the registry's map lock.

use crate::error::{SessionError, SessionResult};
use crate::session::models::Session;
use crate::session::snapshot::SessionSnapshot;
use crate::session::SessionManager;
use crate::storage::Store;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one background sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub swapped_for_ceiling: usize,
    pub swapped_idle: usize,
    pub backed_up: usize,
    pub store_expired: usize,
}

impl SessionManager {
    fn require_store(&self) -> SessionResult<&Arc<dyn Store>> {
        self.store.as_ref().ok_or_else(|| {
            SessionError::Configuration(format!("no store configured for '{}'", self.scope()))
        })
    }

    /// One full sweep; errors are logged per session and never abort it
    pub fn background_process(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport {
            expired: self.process_expires(),
            ..SweepReport::default()
        };

        if self.store.is_some() {
            report.swapped_for_ceiling = self.process_max_active_swaps();
            report.swapped_idle = self.process_max_idle_swaps();
            report.backed_up = self.process_max_idle_backups();
            report.store_expired = self.process_store_expires();
        }

        let elapsed = started.elapsed().as_millis() as u64;
        self.counters.last_sweep_ms.store(elapsed, Ordering::Relaxed);
        if report == SweepReport::default() {
            log::debug!("Sweep of '{}' took {}ms, nothing to do", self.scope(), elapsed);
        } else {
            log::info!("Sweep of '{}' took {}ms: {:?}", self.scope(), elapsed, report);
        }
        report
    }

    /// Expire every in-memory session whose timeout has elapsed
    pub fn process_expires(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for session in self.sessions() {
            let timed_out =
                session.with_state(|s| s.is_valid && !s.expiring && s.timed_out_at(now));
            if timed_out {
                self.expire_session(&session);
                self.recycle(session);
                expired += 1;
            }
        }
        expired
    }

    /// Expire snapshots whose timeout elapsed while they sat in the store.
    ///
    /// Each one is restored into an empty session and expired, so destroy
    /// listeners fire as for an in-memory session. A stale backup of a
    /// session that is still in memory is only removed from the store.
    pub fn process_store_expires(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let ids = match store.keys() {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("Failed to list stored sessions for '{}': {}", self.scope(), e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut expired = 0;
        for id in ids {
            let snapshot = match store.load(&id) {
                Ok(Some(snapshot)) if snapshot.is_stale_at(now) => snapshot,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Failed to inspect stored session {}: {}", id, e);
                    continue;
                }
            };

            let _guard = self.swap_in_lock.lock();
            if self.lookup(&id).is_some() {
                self.remove_from_store(&id);
            } else {
                self.retire_snapshot(&snapshot);
            }
            expired += 1;
        }
        expired
    }

    /// Expire the session a stale snapshot describes, or just purge the
    /// snapshot if it was already invalid
    fn retire_snapshot(&self, snapshot: &SessionSnapshot) {
        if !snapshot.is_valid {
            self.remove_from_store(&snapshot.id);
            return;
        }
        let session = self.create_empty_session();
        snapshot.restore_into(&session, self.resolver.as_deref());
        self.expire_session(&session);
        self.recycle(session);
    }

    /// Swap out the longest-idle sessions until the active count is back
    /// under the ceiling. Sessions idle for less than `min_idle_swap` stay.
    pub fn process_max_active_swaps(&self) -> usize {
        let (max_active, min_idle) = {
            let config = self.config.read();
            (config.max_active_sessions, config.min_idle_swap)
        };
        let Some(max_active) = max_active else {
            return 0;
        };
        if self.store.is_none() {
            return 0;
        }

        let sessions = self.sessions();
        if sessions.len() <= max_active {
            return 0;
        }
        let excess = sessions.len() - max_active;

        let now = Utc::now();
        let mut candidates: Vec<(Duration, Session)> = sessions
            .into_iter()
            .map(|session| (session.with_state(|s| s.idle_time_at(now)), session))
            .filter(|(idle, _)| min_idle.map_or(true, |floor| *idle >= floor))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        log::debug!(
            "'{}' is {} sessions over its ceiling of {}",
            self.scope(),
            excess,
            max_active
        );

        let mut swapped = 0;
        for (_, session) in candidates {
            if swapped >= excess {
                break;
            }
            match self.swap_out(&session) {
                Ok(true) => swapped += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to swap out session {}: {}", session.id(), e),
            }
        }
        swapped
    }

    /// Swap out sessions idle for at least `max_idle_swap`
    pub fn process_max_idle_swaps(&self) -> usize {
        let (max_idle, min_idle) = {
            let config = self.config.read();
            (config.max_idle_swap, config.min_idle_swap)
        };
        let Some(max_idle) = max_idle else {
            return 0;
        };
        if self.store.is_none() {
            return 0;
        }

        let threshold = min_idle.map_or(max_idle, |floor| floor.max(max_idle));
        let now = Utc::now();
        let mut swapped = 0;
        for session in self.sessions() {
            if session.with_state(|s| s.idle_time_at(now)) < threshold {
                continue;
            }
            match self.swap_out(&session) {
                Ok(true) => swapped += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to swap out session {}: {}", session.id(), e),
            }
        }
        swapped
    }

    /// Back up sessions idle for at least `max_idle_backup`
    pub fn process_max_idle_backups(&self) -> usize {
        let Some(threshold) = self.config.read().max_idle_backup else {
            return 0;
        };
        if self.store.is_none() {
            return 0;
        }

        let now = Utc::now();
        let mut backed_up = 0;
        for session in self.sessions() {
            if session.with_state(|s| s.idle_time_at(now)) < threshold {
                continue;
            }
            match self.backup(&session) {
                Ok(true) => backed_up += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to back up session {}: {}", session.id(), e),
            }
        }
        backed_up
    }

    /// Write a session to the store and drop it from memory.
    ///
    /// Returns `Ok(false)` when the session was skipped: invalid, expiring,
    /// in use by a request, or no longer the registered object for its id.
    pub fn swap_out(&self, session: &Session) -> SessionResult<bool> {
        self.swap_out_inner(session, false)
    }

    fn swap_out_inner(&self, session: &Session, force: bool) -> SessionResult<bool> {
        let store = self.require_store()?;
        if !session.is_valid() || session.is_expiring() {
            return Ok(false);
        }
        if !force && session.is_in_use() {
            return Ok(false);
        }
        if !self.is_registered(session) {
            return Ok(false);
        }

        session.fire_passivate();
        let (snapshot, _) = SessionSnapshot::capture(session);
        if let Err(e) = store.save(&snapshot) {
            session.fire_activate();
            return Err(e.into());
        }

        if !self.detach(session) {
            // Replaced or removed while saving
            if !session.is_valid() {
                self.remove_from_store(&snapshot.id);
            }
            return Ok(false);
        }
        if !force && session.is_in_use() {
            // A request picked it up while saving; keep it live unless a
            // lookup already swapped the snapshot back in
            if self.reinstate(session) {
                self.remove_from_store(&snapshot.id);
                session.fire_activate();
                return Ok(false);
            }
            log::debug!("Session {} was swapped back in while saving", snapshot.id);
        }

        self.counters.swapped_out.fetch_add(1, Ordering::Relaxed);
        log::debug!("Swapped out session {} from '{}'", snapshot.id, self.scope());
        Ok(true)
    }

    /// Write a session to the store, keeping it in memory.
    ///
    /// Skipped when the session was neither accessed nor had its attributes
    /// changed since the previous backup.
    pub fn backup(&self, session: &Session) -> SessionResult<bool> {
        let store = self.require_store()?;
        if !session.is_valid() || session.is_expiring() {
            return Ok(false);
        }

        let last_accessed = session.last_accessed_time();
        let changed = session.with_state_mut(|s| {
            let changed = s.dirty || s.last_backup != Some(last_accessed);
            s.dirty = false;
            changed
        });
        if !changed {
            return Ok(false);
        }

        let (snapshot, _) = SessionSnapshot::capture(session);
        if let Err(e) = store.save(&snapshot) {
            session.with_state_mut(|s| s.dirty = true);
            return Err(e.into());
        }
        session.with_state_mut(|s| s.last_backup = Some(last_accessed));

        self.counters.backed_up.fetch_add(1, Ordering::Relaxed);
        log::debug!("Backed up session {} of '{}'", snapshot.id, self.scope());
        Ok(true)
    }

    /// Restore a session from the store into memory.
    ///
    /// A missing snapshot, a load failure, or a stale snapshot all yield
    /// `Ok(None)`; stale snapshots are expired and purged.
    pub fn swap_in(&self, id: &str) -> SessionResult<Option<Session>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let _guard = self.swap_in_lock.lock();
        if let Some(session) = self.lookup(id) {
            return Ok(Some(session));
        }

        let snapshot = match store.load(id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(e) => {
                log::warn!("Failed to load session {} from the store: {}", id, e);
                return Ok(None);
            }
        };

        if snapshot.is_stale_at(Utc::now()) {
            log::debug!("Stored session {} is stale, expiring", id);
            self.retire_snapshot(&snapshot);
            return Ok(None);
        }

        let session = self.create_empty_session();
        snapshot.restore_into(&session, self.resolver.as_deref());

        self.add(session.clone());
        session.fire_activate();
        self.remove_from_store(id);

        self.counters.swapped_in.fetch_add(1, Ordering::Relaxed);
        log::debug!("Swapped in session {} to '{}'", id, self.scope());
        Ok(Some(session))
    }

    /// Restore every stored session; used on start with `save_on_restart`
    pub fn load_from_store(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let ids = match store.keys() {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("Failed to list stored sessions for '{}': {}", self.scope(), e);
                return 0;
            }
        };

        let mut loaded = 0;
        for id in ids {
            match self.swap_in(&id) {
                Ok(Some(_)) => loaded += 1,
                Ok(None) => {}
                Err(e) => log::warn!("Failed to load session {}: {}", id, e),
            }
        }
        log::info!("Loaded {} sessions into '{}' from the store", loaded, self.scope());
        loaded
    }

    /// Write every session to the store and drop it from memory; used on
    /// stop with `save_on_restart`
    pub fn unload_to_store(&self) -> usize {
        if self.store.is_none() {
            return 0;
        }

        let mut unloaded = 0;
        for session in self.sessions() {
            match self.swap_out_inner(&session, true) {
                Ok(true) => unloaded += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to unload session {}: {}", session.id(), e),
            }
        }
        log::info!("Unloaded {} sessions from '{}' to the store", unloaded, self.scope());
        unloaded
    }
}
