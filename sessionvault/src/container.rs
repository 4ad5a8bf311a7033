// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The enclosing container as seen by the session manager
//!
//! A container owns the scope sessions live in, supplies the default
//! timeout and container-level listeners, and knows how to rebuild
//! application objects from their encoded form.

use crate::session::listener::SessionListener;
use crate::session::value::ObjectResolver;
use std::sync::Arc;

/// Default session timeout in seconds (30 minutes)
pub const DEFAULT_MAX_INACTIVE_INTERVAL: i32 = 30 * 60;

/// External collaborator that hosts a session manager
pub trait Container: Send + Sync {
    /// Scope name; namespaces store and cluster traffic
    fn name(&self) -> &str;

    /// Session timeout in seconds applied to new sessions
    fn default_max_inactive_interval(&self) -> i32 {
        DEFAULT_MAX_INACTIVE_INTERVAL
    }

    /// Listeners notified about every session of this container
    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        Vec::new()
    }

    /// Class-resolution context for application objects
    fn object_resolver(&self) -> Option<Arc<dyn ObjectResolver>> {
        None
    }
}

/// Container with fixed settings, for embedding and tests
#[derive(Clone)]
pub struct StaticContainer {
    name: String,
    max_inactive_interval: i32,
    listeners: Vec<Arc<dyn SessionListener>>,
    resolver: Option<Arc<dyn ObjectResolver>>,
}

impl StaticContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_inactive_interval: DEFAULT_MAX_INACTIVE_INTERVAL,
            listeners: Vec::new(),
            resolver: None,
        }
    }

    pub fn with_max_inactive_interval(mut self, seconds: i32) -> Self {
        self.max_inactive_interval = seconds;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ObjectResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl Container for StaticContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_max_inactive_interval(&self) -> i32 {
        self.max_inactive_interval
    }

    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.clone()
    }

    fn object_resolver(&self) -> Option<Arc<dyn ObjectResolver>> {
        self.resolver.clone()
    }
}

impl std::fmt::Debug for StaticContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticContainer")
            .field("name", &self.name)
            .field("max_inactive_interval", &self.max_inactive_interval)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
