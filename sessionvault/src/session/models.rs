// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session entity
//!
//! A [`Session`] is a cheap, clonable handle onto shared session state. The
//! registry that created it owns its presence in the active table; request
//! handlers hold clones while they work with it.

use crate::error::{SessionError, SessionResult};
use crate::session::listener::{AttributeChange, EventDispatcher, SessionListener};
use crate::session::value::AttributeValue;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Mutable state behind a session handle
pub struct SessionState {
    // === Identity ===
    pub(crate) id: String,

    // === Timestamps ===
    pub(crate) creation_time: DateTime<Utc>,
    /// End of the last completed request
    pub(crate) last_accessed_time: DateTime<Utc>,
    /// Start of the current (or last) request
    pub(crate) this_accessed_time: DateTime<Utc>,
    /// Seconds; negative means the session never times out
    pub(crate) max_inactive_interval: i32,

    // === Lifecycle flags ===
    pub(crate) is_new: bool,
    pub(crate) is_valid: bool,
    pub(crate) expiring: bool,
    /// Requests currently holding the session
    pub(crate) access_count: u32,

    // === Contents ===
    pub(crate) attributes: HashMap<String, AttributeValue>,
    pub(crate) listeners: Vec<Arc<dyn SessionListener>>,

    /// Access time captured by the last backup; not persisted
    pub(crate) last_backup: Option<DateTime<Utc>>,
    /// Attributes changed since the last backup
    pub(crate) dirty: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            creation_time: now,
            last_accessed_time: now,
            this_accessed_time: now,
            max_inactive_interval: -1,
            is_new: false,
            is_valid: false,
            expiring: false,
            access_count: 0,
            attributes: HashMap::new(),
            listeners: Vec::new(),
            last_backup: None,
            dirty: false,
        }
    }
}

impl SessionState {
    /// Clear everything so the allocation can back another session
    pub(crate) fn recycle(&mut self) {
        self.id.clear();
        self.attributes.clear();
        self.listeners.clear();
        self.max_inactive_interval = -1;
        self.is_new = false;
        self.is_valid = false;
        self.expiring = false;
        self.access_count = 0;
        self.last_backup = None;
        self.dirty = false;
    }

    /// Stamp a fresh session: timestamps, timeout, identity
    pub(crate) fn initialize(&mut self, id: String, max_inactive_interval: i32) {
        let now = Utc::now();
        self.id = id;
        self.creation_time = now;
        self.last_accessed_time = now;
        self.this_accessed_time = now;
        self.max_inactive_interval = max_inactive_interval;
        self.is_new = true;
        self.is_valid = true;
        self.expiring = false;
        self.access_count = 0;
        self.last_backup = None;
        self.dirty = false;
    }

    pub(crate) fn idle_time_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_accessed_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Idle time has reached the session's own timeout
    pub(crate) fn timed_out_at(&self, now: DateTime<Utc>) -> bool {
        if self.max_inactive_interval < 0 {
            return false;
        }
        let limit = Duration::from_secs(self.max_inactive_interval as u64);
        self.idle_time_at(now) >= limit
    }
}

struct SessionInner {
    state: RwLock<SessionState>,
    dispatcher: Arc<EventDispatcher>,
}

/// Handle onto one user session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn from_state(state: SessionState, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(state),
                dispatcher,
            }),
        }
    }

    /// Reclaim the state if this is the last handle, for the recycle pool
    pub(crate) fn into_state(self) -> Option<SessionState> {
        Arc::try_unwrap(self.inner)
            .ok()
            .map(|inner| inner.state.into_inner())
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.inner.state.read())
    }

    pub(crate) fn with_state_mut<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.inner.state.write())
    }

    /// True when both handles point at the same session object
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // === Identity and timestamps ===

    pub fn id(&self) -> String {
        self.inner.state.read().id.clone()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.inner.state.read().creation_time
    }

    pub fn last_accessed_time(&self) -> DateTime<Utc> {
        self.inner.state.read().last_accessed_time
    }

    pub fn this_accessed_time(&self) -> DateTime<Utc> {
        self.inner.state.read().this_accessed_time
    }

    pub fn max_inactive_interval(&self) -> i32 {
        self.inner.state.read().max_inactive_interval
    }

    /// Seconds of inactivity before expiry; negative disables expiry
    pub fn set_max_inactive_interval(&self, seconds: i32) {
        self.inner.state.write().max_inactive_interval = seconds;
    }

    pub fn is_new(&self) -> bool {
        self.inner.state.read().is_new
    }

    /// Time since the end of the last request
    pub fn idle_time(&self) -> Duration {
        self.inner.state.read().idle_time_at(Utc::now())
    }

    /// Valid and not timed out. A session in the middle of expiring still
    /// reports valid so destroy listeners can read it.
    pub fn is_valid(&self) -> bool {
        let state = self.inner.state.read();
        if !state.is_valid {
            return false;
        }
        state.expiring || !state.timed_out_at(Utc::now())
    }

    pub(crate) fn is_expiring(&self) -> bool {
        self.inner.state.read().expiring
    }

    /// A request is currently holding this session
    pub fn is_in_use(&self) -> bool {
        self.inner.state.read().access_count > 0
    }

    // === Request bracketing ===

    /// Mark the start of a request
    pub fn access(&self) {
        let mut state = self.inner.state.write();
        state.this_accessed_time = Utc::now();
        state.access_count += 1;
    }

    /// Mark the end of a request; idle time is measured from here
    pub fn end_access(&self) {
        let mut state = self.inner.state.write();
        let now = Utc::now();
        state.this_accessed_time = now;
        state.last_accessed_time = now;
        state.is_new = false;
        state.access_count = state.access_count.saturating_sub(1);
    }

    // === Attributes ===

    pub fn get_attribute(&self, name: &str) -> SessionResult<Option<AttributeValue>> {
        let state = self.inner.state.read();
        if !state.is_valid {
            return Err(SessionError::InvalidSession(state.id.clone()));
        }
        Ok(state.attributes.get(name).cloned())
    }

    pub fn attribute_names(&self) -> SessionResult<Vec<String>> {
        let state = self.inner.state.read();
        if !state.is_valid {
            return Err(SessionError::InvalidSession(state.id.clone()));
        }
        Ok(state.attributes.keys().cloned().collect())
    }

    /// Copy of the attribute map (empty for an invalidated session)
    pub fn attributes(&self) -> HashMap<String, AttributeValue> {
        self.inner.state.read().attributes.clone()
    }

    /// Bind a value; binding `Null` is the same as removing the attribute
    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> SessionResult<()> {
        let name = name.into();
        let value = value.into();
        if value.is_null() {
            self.remove_attribute(&name)?;
            return Ok(());
        }

        let change = {
            let mut state = self.inner.state.write();
            if !state.is_valid {
                return Err(SessionError::InvalidSession(state.id.clone()));
            }
            state.dirty = true;
            match state.attributes.insert(name.clone(), value.clone()) {
                Some(old_value) => AttributeChange::Replaced {
                    name,
                    old_value,
                    new_value: value,
                },
                None => AttributeChange::Added { name, value },
            }
        };

        self.fire_attribute_changed(&change);
        Ok(())
    }

    pub fn remove_attribute(&self, name: &str) -> SessionResult<Option<AttributeValue>> {
        let removed = {
            let mut state = self.inner.state.write();
            if !state.is_valid {
                return Err(SessionError::InvalidSession(state.id.clone()));
            }
            let removed = state.attributes.remove(name);
            state.dirty |= removed.is_some();
            removed
        };

        if let Some(value) = &removed {
            self.fire_attribute_changed(&AttributeChange::Removed {
                name: name.to_string(),
                value: value.clone(),
            });
        }
        Ok(removed)
    }

    /// Attach an observer to this session only
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.state.write().listeners.push(listener);
    }

    // === Lifecycle plumbing used by the manager ===

    pub(crate) fn set_id(&self, id: String) -> String {
        std::mem::replace(&mut self.inner.state.write().id, id)
    }

    /// Claim the right to expire this session. Returns false if it is already
    /// invalid or another caller is expiring it.
    pub(crate) fn begin_expire(&self) -> bool {
        let mut state = self.inner.state.write();
        if !state.is_valid || state.expiring {
            return false;
        }
        state.expiring = true;
        true
    }

    /// Invalidate and clear contents, notifying attribute removals
    pub(crate) fn finish_expire(&self) {
        let (attributes, listeners) = {
            let mut state = self.inner.state.write();
            state.is_valid = false;
            state.expiring = false;
            (
                std::mem::take(&mut state.attributes),
                std::mem::take(&mut state.listeners),
            )
        };

        let container = self.inner.dispatcher.snapshot();
        for (name, value) in attributes {
            let change = AttributeChange::Removed { name, value };
            for listener in listeners.iter().chain(container.iter()) {
                listener.on_attribute_changed(self, &change);
            }
        }
    }

    fn observers(&self) -> Vec<Arc<dyn SessionListener>> {
        let mut observers = self.inner.state.read().listeners.clone();
        observers.extend(self.inner.dispatcher.snapshot());
        observers
    }

    fn fire_attribute_changed(&self, change: &AttributeChange) {
        for listener in self.observers() {
            listener.on_attribute_changed(self, change);
        }
    }

    pub(crate) fn fire_created(&self) {
        for listener in self.observers() {
            listener.on_created(self);
        }
    }

    pub(crate) fn fire_destroyed(&self) {
        for listener in self.observers() {
            listener.on_destroyed(self);
        }
    }

    pub(crate) fn fire_passivate(&self) {
        for listener in self.observers() {
            listener.on_passivate(self);
        }
    }

    pub(crate) fn fire_activate(&self) {
        for listener in self.observers() {
            listener.on_activate(self);
        }
    }

    pub(crate) fn fire_id_changed(&self, old_id: &str) {
        for listener in self.observers() {
            listener.on_id_changed(self, old_id);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Session")
            .field("id", &state.id)
            .field("valid", &state.is_valid)
            .field("new", &state.is_new)
            .field("attributes", &state.attributes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn live_session(id: &str, dispatcher: Arc<EventDispatcher>) -> Session {
        let mut state = SessionState::default();
        state.initialize(id.to_string(), 60);
        Session::from_state(state, dispatcher)
    }

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<AttributeChange>>,
    }

    impl SessionListener for Recorder {
        fn on_attribute_changed(&self, _session: &Session, change: &AttributeChange) {
            self.changes.lock().push(change.clone());
        }
    }

    #[test]
    fn test_attribute_events_in_order() {
        let recorder = Arc::new(Recorder::default());
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        session.add_listener(recorder.clone());

        session.set_attribute("user", "alice").unwrap();
        session.set_attribute("user", "bob").unwrap();
        session.remove_attribute("user").unwrap();
        session.remove_attribute("missing").unwrap();

        let changes = recorder.changes.lock();
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], AttributeChange::Added { .. }));
        assert!(matches!(changes[1], AttributeChange::Replaced { .. }));
        assert!(matches!(changes[2], AttributeChange::Removed { .. }));
    }

    #[test]
    fn test_null_binding_removes() {
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        session.set_attribute("k", 1).unwrap();
        session.set_attribute("k", AttributeValue::Null).unwrap();
        assert_eq!(session.get_attribute("k").unwrap(), None);
    }

    #[test]
    fn test_container_listener_sees_session_events() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Arc::new(EventDispatcher::with_listeners(vec![
            recorder.clone() as Arc<dyn SessionListener>,
        ]));
        let session = live_session("S1", dispatcher);

        session.set_attribute("k", true).unwrap();
        assert_eq!(recorder.changes.lock().len(), 1);
    }

    #[test]
    fn test_expire_is_one_way() {
        let recorder = Arc::new(Recorder::default());
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        session.add_listener(recorder.clone());
        session.set_attribute("a", 1).unwrap();

        assert!(session.begin_expire());
        assert!(!session.begin_expire());
        assert!(session.is_valid());
        session.finish_expire();

        assert!(!session.is_valid());
        assert!(!session.begin_expire());
        assert!(session.attributes().is_empty());
        assert!(matches!(
            session.set_attribute("a", 2),
            Err(SessionError::InvalidSession(_))
        ));
        // one Added, one Removed from the clear
        assert_eq!(recorder.changes.lock().len(), 2);
    }

    #[test]
    fn test_timeout_rules() {
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        session.with_state_mut(|s| {
            s.last_accessed_time = Utc::now() - chrono::Duration::seconds(5);
        });

        session.set_max_inactive_interval(10);
        assert!(session.is_valid());

        session.set_max_inactive_interval(2);
        assert!(!session.is_valid());

        session.set_max_inactive_interval(-1);
        assert!(session.is_valid());
    }

    #[test]
    fn test_access_bracketing() {
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        assert!(session.is_new());

        session.access();
        assert!(session.is_in_use());
        session.end_access();

        assert!(!session.is_in_use());
        assert!(!session.is_new());
        assert!(session.idle_time() < Duration::from_secs(1));
    }

    #[test]
    fn test_into_state_requires_last_handle() {
        let session = live_session("S1", Arc::new(EventDispatcher::new()));
        let other = session.clone();
        assert!(session.into_state().is_none());

        let state = other.into_state().expect("last handle");
        assert_eq!(state.id, "S1");
    }
}
