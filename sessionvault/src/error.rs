// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for session management

use crate::session::snapshot::SnapshotError;
use crate::storage::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Fatal at startup: bad settings or missing store/cluster wiring
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The active-session ceiling was reached
    #[error("Too many active sessions (maximum {max})")]
    TooManyActiveSessions { max: usize },

    /// Operation on a session that has already been invalidated
    #[error("Session has been invalidated: {0}")]
    InvalidSession(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Store(StoreError::IoError(err))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
