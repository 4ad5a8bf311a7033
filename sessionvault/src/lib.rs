// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! SessionVault - session lifecycle management for web containers
//!
//! SessionVault keeps the per-user sessions of one container scope: it
//! creates them under unguessable ids, expires them after inactivity, swaps
//! idle ones out to durable storage and back, and replicates new sessions
//! to peer nodes.
//!
//! # Features
//!
//! - **Registry**: Thread-safe table of active sessions with an optional ceiling
//! - **Observers**: Typed listeners for creation, destruction, attributes,
//!   passivation and activation
//! - **Persistence**: Idle swap-out, backup and restart persistence over a
//!   pluggable store (Sled by default)
//! - **Replication**: Best-effort broadcast of new sessions to peers
//!
//! # Usage
//!
//! ```ignore
//! use sessionvault::{SessionManager, StaticContainer};
//! use std::sync::Arc;
//!
//! let manager = SessionManager::builder(Arc::new(StaticContainer::new("/shop"))).build()?;
//! manager.start()?;
//!
//! let session = manager.create_session()?;
//! session.set_attribute("user", "alice")?;
//! let found = manager.find_session(&session.id())?;
//!
//! manager.stop()?;
//! ```

pub mod cluster;
pub mod config;
pub mod container;
pub mod error;
pub mod persistence;
pub mod session;
pub mod storage;

pub use cluster::{ClusterReceiver, ClusterReplicator, ClusterSender, LocalCluster};
pub use config::ManagerConfig;
pub use container::{Container, StaticContainer};
pub use error::{SessionError, SessionResult};
pub use persistence::SweepReport;
pub use session::{
    AttributeChange, AttributeValue, ManagerStats, ObjectResolver, Session, SessionListener,
    SessionManager, SessionObject, SessionProvider,
};
pub use storage::{DriverStore, Store, StoreError};

/// SessionVault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SessionVault crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
