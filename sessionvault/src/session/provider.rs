// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session provider abstraction
//!
//! This module provides the trait collaborators program against instead of a
//! concrete registry: request pipelines create and look up sessions through
//! it, and the cluster replicator installs inbound sessions through it.

use crate::error::SessionResult;
use crate::session::models::Session;
use std::sync::Arc;

/// Abstract session registry interface
///
/// Implemented by [`SessionManager`](crate::session::SessionManager). Every
/// registry is an explicitly constructed instance; there is no process-wide
/// session table.
pub trait SessionProvider: Send + Sync {
    /// Scope the sessions of this provider belong to
    fn scope(&self) -> &str;

    /// Create and register a new session
    ///
    /// # Returns
    /// * `Ok(session)` - A valid, registered session with a fresh id
    /// * `Err(TooManyActiveSessions)` - The active-session ceiling was reached
    fn create_session(&self) -> SessionResult<Session>;

    /// Build an unregistered session shell
    ///
    /// Used when a session's state comes from elsewhere (a store or a
    /// peer node) and is copied in before [`add`](Self::add).
    fn create_empty_session(&self) -> Session;

    /// Look up a session by id
    ///
    /// # Returns
    /// * `Ok(Some(session))` - Found in memory or restored from the store
    /// * `Ok(None)` - Unknown, expired, or only a stale snapshot existed
    fn find_session(&self, id: &str) -> SessionResult<Option<Session>>;

    /// Register a session, replacing any session with the same id
    fn add(&self, session: Session);

    /// Remove a session from memory and from the store
    fn remove(&self, session: &Session);

    /// Point-in-time copy of the registered sessions
    fn sessions(&self) -> Vec<Session>;

    /// Number of sessions held in memory
    fn session_count(&self) -> usize {
        self.sessions().len()
    }
}

impl<P: SessionProvider + ?Sized> SessionProvider for Arc<P> {
    fn scope(&self) -> &str {
        (**self).scope()
    }

    fn create_session(&self) -> SessionResult<Session> {
        (**self).create_session()
    }

    fn create_empty_session(&self) -> Session {
        (**self).create_empty_session()
    }

    fn find_session(&self, id: &str) -> SessionResult<Option<Session>> {
        (**self).find_session(id)
    }

    fn add(&self, session: Session) {
        (**self).add(session)
    }

    fn remove(&self, session: &Session) {
        (**self).remove(session)
    }

    fn sessions(&self) -> Vec<Session> {
        (**self).sessions()
    }

    fn session_count(&self) -> usize {
        (**self).session_count()
    }
}
