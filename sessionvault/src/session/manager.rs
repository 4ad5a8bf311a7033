// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session registry
//!
//! The [`SessionManager`] is the sole owner of the in-memory table of active
//! sessions for one container scope. It creates, finds, and removes sessions,
//! recycles cleared session shells, keeps lifecycle statistics, and owns the
//! background tasks that expire, swap, back up, and replicate sessions.
//!
//! Managers are explicitly constructed and handed to collaborators by
//! `Arc`; there is no process-wide registry.

use crate::cluster::ClusterReplicator;
use crate::config::ManagerConfig;
use crate::container::Container;
use crate::error::{SessionError, SessionResult};
use crate::persistence::BackgroundTask;
use crate::session::id_generator::SessionIdGenerator;
use crate::session::listener::{EventDispatcher, SessionListener};
use crate::session::models::{Session, SessionState};
use crate::session::provider::SessionProvider;
use crate::session::value::ObjectResolver;
use crate::storage::Store;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of session identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl IdGenerator for SessionIdGenerator {
    fn generate(&self) -> String {
        SessionIdGenerator::generate(self)
    }
}

/// Lifecycle counters, updated lock-free
#[derive(Default)]
pub(crate) struct ManagerCounters {
    pub(crate) created: AtomicU64,
    pub(crate) duplicates: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) expired: AtomicU64,
    pub(crate) max_active: AtomicUsize,
    pub(crate) max_alive_secs: AtomicU64,
    pub(crate) total_alive_secs: AtomicU64,
    pub(crate) swapped_out: AtomicU64,
    pub(crate) swapped_in: AtomicU64,
    pub(crate) backed_up: AtomicU64,
    pub(crate) last_sweep_ms: AtomicU64,
}

impl ManagerCounters {
    fn record_active(&self, active: usize) {
        self.max_active.fetch_max(active, Ordering::Relaxed);
    }

    fn record_expired(&self, alive_secs: u64) {
        self.expired.fetch_add(1, Ordering::Relaxed);
        self.total_alive_secs.fetch_add(alive_secs, Ordering::Relaxed);
        self.max_alive_secs.fetch_max(alive_secs, Ordering::Relaxed);
    }
}

/// Point-in-time view of a manager's statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManagerStats {
    /// Sessions currently held in memory
    pub active: usize,
    /// Sessions created since start
    pub created: u64,
    /// Generated ids that collided with an active session
    pub duplicates: u64,
    /// Creations refused because of the active-session ceiling
    pub rejected: u64,
    pub expired: u64,
    /// High-water mark of sessions held in memory
    pub max_active: usize,
    pub max_alive_secs: u64,
    pub average_alive_secs: u64,
    pub swapped_out: u64,
    pub swapped_in: u64,
    pub backed_up: u64,
    /// Duration of the last background sweep
    pub last_sweep_ms: u64,
}

/// Registry of active sessions for one container scope
pub struct SessionManager {
    container: Arc<dyn Container>,
    scope: String,
    pub(crate) config: RwLock<ManagerConfig>,
    id_generator: Box<dyn IdGenerator>,
    dispatcher: Arc<EventDispatcher>,
    pub(crate) resolver: Option<Arc<dyn ObjectResolver>>,
    /// Active sessions indexed by id
    sessions: RwLock<HashMap<String, Session>>,
    /// Cleared shells available for reuse
    recycled: Mutex<Vec<SessionState>>,
    pub(crate) store: Option<Arc<dyn Store>>,
    pub(crate) replicator: Option<Arc<ClusterReplicator>>,
    pub(crate) counters: ManagerCounters,
    /// Serializes swap-ins so one id is never restored twice
    pub(crate) swap_in_lock: Mutex<()>,
    tasks: Mutex<Vec<BackgroundTask>>,
    started: AtomicBool,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    container: Arc<dyn Container>,
    config: ManagerConfig,
    store: Option<Arc<dyn Store>>,
    replicator: Option<ClusterReplicator>,
    id_generator: Option<Box<dyn IdGenerator>>,
}

impl SessionManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable store for swapping, backup and restart persistence
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replicate new sessions to, and absorb sessions from, peer nodes
    pub fn replicator(mut self, replicator: ClusterReplicator) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Replace the digest-based id generator
    pub fn id_generator(mut self, generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Validate the wiring and build the manager
    pub fn build(self) -> SessionResult<Arc<SessionManager>> {
        self.config.validate()?;
        let scope = self.container.name().to_string();

        if self.config.requires_store() && self.store.is_none() {
            return Err(SessionError::Configuration(format!(
                "session persistence is enabled for '{}' but no store is configured",
                scope
            )));
        }
        if let Some(store) = &self.store {
            if store.scope() != scope {
                return Err(SessionError::Configuration(format!(
                    "store is bound to scope '{}' but the manager serves '{}'",
                    store.scope(),
                    scope
                )));
            }
        }
        if let Some(replicator) = &self.replicator {
            if replicator.sender_id() != scope {
                return Err(SessionError::Configuration(format!(
                    "replicator sender id '{}' does not match scope '{}'",
                    replicator.sender_id(),
                    scope
                )));
            }
        }

        let id_generator = match self.id_generator {
            Some(generator) => generator,
            None => Box::new(SessionIdGenerator::new(
                self.config.session_id_length,
                &self.config.digest_algorithm,
                self.config.route_suffix.clone(),
            )?),
        };

        let dispatcher = Arc::new(EventDispatcher::with_listeners(self.container.listeners()));
        let resolver = self.container.object_resolver();

        log::debug!(
            "Session manager for '{}' built (store: {}, cluster: {})",
            scope,
            self.store.is_some(),
            self.replicator.is_some()
        );

        Ok(Arc::new(SessionManager {
            container: self.container,
            scope,
            config: RwLock::new(self.config),
            id_generator,
            dispatcher,
            resolver,
            sessions: RwLock::new(HashMap::new()),
            recycled: Mutex::new(Vec::new()),
            store: self.store,
            replicator: self.replicator.map(Arc::new),
            counters: ManagerCounters::default(),
            swap_in_lock: Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }))
    }
}

impl SessionManager {
    /// Start building a manager for a container
    pub fn builder(container: Arc<dyn Container>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            container,
            config: ManagerConfig::default(),
            store: None,
            replicator: None,
            id_generator: None,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    pub fn replicator(&self) -> Option<&Arc<ClusterReplicator>> {
        self.replicator.as_ref()
    }

    /// Register a container-level listener
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.dispatcher.add(listener);
    }

    // === Configuration ===

    pub fn config(&self) -> ManagerConfig {
        self.config.read().clone()
    }

    /// Timeout applied to new sessions, in seconds
    pub fn max_inactive_interval(&self) -> i32 {
        self.config
            .read()
            .max_inactive_interval
            .unwrap_or_else(|| self.container.default_max_inactive_interval())
    }

    pub fn set_max_inactive_interval(&self, seconds: i32) {
        self.config.write().max_inactive_interval = Some(seconds);
    }

    pub fn set_max_active_sessions(&self, max: Option<usize>) {
        self.config.write().max_active_sessions = max;
    }

    pub fn set_min_idle_swap(&self, idle: Option<Duration>) {
        self.config.write().min_idle_swap = idle;
    }

    pub fn set_max_idle_swap(&self, idle: Option<Duration>) {
        self.config.write().max_idle_swap = idle;
    }

    pub fn set_max_idle_backup(&self, idle: Option<Duration>) {
        self.config.write().max_idle_backup = idle;
    }

    /// Takes effect the next time the manager is started
    pub fn set_check_interval(&self, interval: Duration) {
        self.config.write().check_interval = interval;
    }

    // === Registry operations ===

    /// Create and register a new session
    ///
    /// Fails with [`SessionError::TooManyActiveSessions`] when the ceiling is
    /// reached; no existing session is evicted to make room.
    pub fn create_session(&self) -> SessionResult<Session> {
        let max_active = self.config.read().max_active_sessions;
        let max_inactive_interval = self.max_inactive_interval();
        let mut state = self.recycled.lock().pop().unwrap_or_default();

        let session = {
            let mut sessions = self.sessions.write();
            if let Some(max) = max_active {
                if sessions.len() >= max {
                    drop(sessions);
                    self.recycled.lock().push(state);
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Rejected new session for '{}': {} active sessions is the maximum",
                        self.scope,
                        max
                    );
                    return Err(SessionError::TooManyActiveSessions { max });
                }
            }

            let id = self.unique_id(&sessions);
            state.initialize(id.clone(), max_inactive_interval);
            let session = Session::from_state(state, self.dispatcher.clone());
            sessions.insert(id, session.clone());
            self.counters.record_active(sessions.len());
            session
        };

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created session {} in '{}'", session.id(), self.scope);
        session.fire_created();

        if let Some(replicator) = &self.replicator {
            replicator.replicate(&session);
        }
        Ok(session)
    }

    /// Generate an id not present in the table, counting collisions
    fn unique_id(&self, sessions: &HashMap<String, Session>) -> String {
        loop {
            let id = self.id_generator.generate();
            if !sessions.contains_key(&id) {
                return id;
            }
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            log::debug!("Generated duplicate session id {}, retrying", id);
        }
    }

    /// Unregistered, invalid shell to copy external state into
    pub fn create_empty_session(&self) -> Session {
        let state = self.recycled.lock().pop().unwrap_or_default();
        Session::from_state(state, self.dispatcher.clone())
    }

    /// Look up a session, swapping it in from the store on a miss
    pub fn find_session(&self, id: &str) -> SessionResult<Option<Session>> {
        match self.lookup(id) {
            Some(session) if session.is_valid() => Ok(Some(session)),
            Some(session) => {
                self.expire_session(&session);
                self.recycle(session);
                Ok(None)
            }
            None => self.swap_in(id),
        }
    }

    /// Register a session, replacing any session with the same id
    pub fn add(&self, session: Session) {
        let id = session.id();
        let mut sessions = self.sessions.write();
        sessions.insert(id, session);
        self.counters.record_active(sessions.len());
    }

    /// Remove a session from memory and from the store
    pub fn remove(&self, session: &Session) {
        let id = session.id();
        self.sessions.write().remove(&id);
        self.remove_from_store(&id);
    }

    /// Point-in-time copy of the sessions held in memory
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Ids of the sessions held in memory
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// In-memory lookup only
    pub(crate) fn lookup(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Whether this exact session object is the one registered under its id
    pub(crate) fn is_registered(&self, session: &Session) -> bool {
        let id = session.id();
        self.sessions
            .read()
            .get(&id)
            .map(|current| current.ptr_eq(session))
            .unwrap_or(false)
    }

    /// Drop this exact session object from the table. A different session
    /// registered under the same id is left alone.
    pub(crate) fn detach(&self, session: &Session) -> bool {
        let id = session.id();
        let mut sessions = self.sessions.write();
        match sessions.get(&id) {
            Some(current) if current.ptr_eq(session) => {
                sessions.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Put a detached session back under its id unless another session has
    /// taken the id since
    pub(crate) fn reinstate(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.entry(session.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                self.counters.record_active(sessions.len());
                true
            }
        }
    }

    pub(crate) fn remove_from_store(&self, id: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(id) {
                log::warn!("Failed to remove session {} from the store: {}", id, e);
            }
        }
    }

    /// Expire a session: notify, unregister, purge from the store, clear.
    /// Expiring an already invalid session only makes sure it is unregistered.
    pub fn expire_session(&self, session: &Session) {
        if !session.begin_expire() {
            self.detach(session);
            return;
        }

        let id = session.id();
        session.fire_destroyed();
        self.detach(session);
        self.remove_from_store(&id);

        let alive = (Utc::now() - session.creation_time()).num_seconds().max(0) as u64;
        self.counters.record_expired(alive);
        session.finish_expire();
        log::debug!("Expired session {} in '{}'", id, self.scope);
    }

    /// Invalidate a session on behalf of the application
    pub fn invalidate(&self, session: &Session) {
        self.expire_session(session);
    }

    /// Give a session a new id, keeping its state
    pub fn change_session_id(&self, session: &Session) -> SessionResult<String> {
        if !session.is_valid() {
            return Err(SessionError::InvalidSession(session.id()));
        }

        let (old_id, new_id) = {
            let mut sessions = self.sessions.write();
            let new_id = self.unique_id(&sessions);
            let old_id = session.set_id(new_id.clone());
            if sessions
                .get(&old_id)
                .map(|current| current.ptr_eq(session))
                .unwrap_or(false)
            {
                sessions.remove(&old_id);
            }
            sessions.insert(new_id.clone(), session.clone());
            (old_id, new_id)
        };

        self.remove_from_store(&old_id);
        log::debug!("Session id {} changed to {}", old_id, new_id);
        session.fire_id_changed(&old_id);
        Ok(new_id)
    }

    /// Return a session's shell to the pool if nothing else holds it
    pub(crate) fn recycle(&self, session: Session) {
        if let Some(mut state) = session.into_state() {
            state.recycle();
            let capacity = self.config.read().recycle_pool_size;
            let mut pool = self.recycled.lock();
            if pool.len() < capacity {
                pool.push(state);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn recycled_count(&self) -> usize {
        self.recycled.lock().len()
    }

    pub fn stats(&self) -> ManagerStats {
        let c = &self.counters;
        let expired = c.expired.load(Ordering::Relaxed);
        let total_alive = c.total_alive_secs.load(Ordering::Relaxed);
        ManagerStats {
            active: self.session_count(),
            created: c.created.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            expired,
            max_active: c.max_active.load(Ordering::Relaxed),
            max_alive_secs: c.max_alive_secs.load(Ordering::Relaxed),
            average_alive_secs: if expired == 0 { 0 } else { total_alive / expired },
            swapped_out: c.swapped_out.load(Ordering::Relaxed),
            swapped_in: c.swapped_in.load(Ordering::Relaxed),
            backed_up: c.backed_up.load(Ordering::Relaxed),
            last_sweep_ms: c.last_sweep_ms.load(Ordering::Relaxed),
        }
    }

    // === Lifecycle ===

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start the background sweeper (and the cluster receiver, if wired).
    /// With `save_on_restart`, sessions left in the store are loaded first.
    pub fn start(self: &Arc<Self>) -> SessionResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::Lifecycle(format!(
                "session manager for '{}' is already started",
                self.scope
            )));
        }

        let config = self.config();
        if config.save_on_restart {
            self.load_from_store();
        }

        let mut tasks = Vec::new();
        tasks.push(BackgroundTask::spawn(
            format!("session-sweeper{}", self.scope.replace('/', "-")),
            config.check_interval,
            Arc::downgrade(self),
            |manager: &SessionManager| {
                manager.background_process();
            },
        )?);

        if self.replicator.is_some() {
            tasks.push(BackgroundTask::spawn(
                format!("session-cluster{}", self.scope.replace('/', "-")),
                config.cluster_poll_interval,
                Arc::downgrade(self),
                |manager: &SessionManager| {
                    manager.process_cluster_inbound();
                },
            )?);
        }

        *self.tasks.lock() = tasks;
        log::info!("Session manager for '{}' started", self.scope);
        Ok(())
    }

    /// Stop background work, then either write every session to the store
    /// (`save_on_restart`) or expire them all
    pub fn stop(&self) -> SessionResult<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let timeout = self.config.read().shutdown_timeout;
        let tasks: Vec<BackgroundTask> = std::mem::take(&mut *self.tasks.lock());
        let mut clean = true;
        for task in tasks {
            clean &= task.stop(timeout);
        }

        if self.config.read().save_on_restart {
            self.unload_to_store();
        }
        for session in self.sessions() {
            self.expire_session(&session);
        }

        log::info!("Session manager for '{}' stopped", self.scope);
        if clean {
            Ok(())
        } else {
            Err(SessionError::Lifecycle(format!(
                "background tasks for '{}' did not stop within {:?}",
                self.scope, timeout
            )))
        }
    }

    /// Drain inbound replication messages into this registry
    pub fn process_cluster_inbound(&self) -> usize {
        match &self.replicator {
            Some(replicator) => replicator.receive_into(self, self.resolver.as_deref()),
            None => 0,
        }
    }
}

impl SessionProvider for SessionManager {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn create_session(&self) -> SessionResult<Session> {
        SessionManager::create_session(self)
    }

    fn create_empty_session(&self) -> Session {
        SessionManager::create_empty_session(self)
    }

    fn find_session(&self, id: &str) -> SessionResult<Option<Session>> {
        SessionManager::find_session(self, id)
    }

    fn add(&self, session: Session) {
        SessionManager::add(self, session)
    }

    fn remove(&self, session: &Session) {
        SessionManager::remove(self, session)
    }

    fn sessions(&self) -> Vec<Session> {
        SessionManager::sessions(self)
    }

    fn session_count(&self) -> usize {
        SessionManager::session_count(self)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("scope", &self.scope)
            .field("active", &self.session_count())
            .field("started", &self.is_started())
            .finish()
    }
}
