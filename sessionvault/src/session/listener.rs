// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle observers
//!
//! Listeners can be attached to a single session or registered for the whole
//! container. Every notification is delivered without any session or
//! registry lock held, so listeners may call back into the session.

use crate::session::models::Session;
use crate::session::value::AttributeValue;
use parking_lot::RwLock;
use std::sync::Arc;

/// What happened to a session attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeChange {
    Added {
        name: String,
        value: AttributeValue,
    },
    Replaced {
        name: String,
        old_value: AttributeValue,
        new_value: AttributeValue,
    },
    Removed {
        name: String,
        value: AttributeValue,
    },
}

impl AttributeChange {
    pub fn name(&self) -> &str {
        match self {
            AttributeChange::Added { name, .. }
            | AttributeChange::Replaced { name, .. }
            | AttributeChange::Removed { name, .. } => name,
        }
    }
}

/// Typed observer for session lifecycle events
///
/// All methods default to no-ops so implementors only override what they need.
pub trait SessionListener: Send + Sync {
    fn on_created(&self, _session: &Session) {}

    /// Fired while the session is expiring, before its attributes are cleared
    fn on_destroyed(&self, _session: &Session) {}

    fn on_attribute_changed(&self, _session: &Session, _change: &AttributeChange) {}

    /// Fired before the session is written out and dropped from memory
    fn on_passivate(&self, _session: &Session) {}

    /// Fired after the session is brought back into memory from a snapshot
    fn on_activate(&self, _session: &Session) {}

    fn on_id_changed(&self, _session: &Session, _old_id: &str) {}
}

/// Container-level listener list shared by a manager and all its sessions
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(listeners: Vec<Arc<dyn SessionListener>>) -> Self {
        Self {
            listeners: RwLock::new(listeners),
        }
    }

    pub fn add(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Copy of the current listeners, so callers can notify lock-free
    pub fn snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.read().clone()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.len())
            .finish()
    }
}
