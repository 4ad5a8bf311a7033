// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle management
//!
//! This module provides:
//! - The session entity and its attribute values
//! - Lifecycle and attribute observers
//! - Session id generation
//! - The registry of active sessions for one scope
//! - The snapshot form used by stores and replication
//!
//! # Session Providers
//!
//! Collaborators program against [`SessionProvider`]; [`SessionManager`] is
//! the implementation. Each manager is an explicitly constructed instance
//! serving one container scope.

pub mod id_generator;
pub mod listener;
pub mod manager;
pub mod models;
pub mod provider;
pub mod snapshot;
pub mod value;

pub use id_generator::{strip_route, DigestAlgorithm, SessionIdGenerator};
pub use listener::{AttributeChange, SessionListener};
pub use manager::{IdGenerator, ManagerStats, SessionManager, SessionManagerBuilder};
pub use models::Session;
pub use provider::SessionProvider;
pub use snapshot::{SessionSnapshot, SnapshotError, SnapshotValue};
pub use value::{AttributeValue, ObjectResolver, SessionObject};
