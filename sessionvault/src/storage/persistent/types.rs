// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage driver types and error handling
//!
//! This module defines the types, enums, and error handling shared by the
//! storage drivers and the session stores built on top of them.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Storage driver type configuration
///
/// Specifies which underlying key/value technology backs a session store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StorageType {
    /// Sled - Pure Rust embedded database
    /// Best for: durable single-node session stores
    #[default]
    Sled,

    /// Memory - In-memory storage
    /// Best for: unit testing, stores shared by registries in one process
    Memory,
}

impl std::str::FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sled" => Ok(StorageType::Sled),
            "memory" => Ok(StorageType::Memory),
            _ => Err(format!(
                "Unknown storage type: {}. Valid options: sled, memory",
                s
            )),
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Sled => "sled",
            StorageType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Error type for storage driver and session store operations
///
/// Covers the failure modes of persisting session snapshots. "Not found" is
/// never an error at this level: lookups return `Ok(None)` instead.
#[derive(Debug)]
pub enum StoreError {
    /// I/O related errors (file system, network, etc.)
    IoError(std::io::Error),

    /// Snapshot serialization failed
    SerializationError(String),

    /// Stored bytes could not be turned back into a snapshot
    DeserializationError(String),

    /// Stored key does not belong to the expected layout
    InvalidKey(String),

    /// Driver-specific error (Sled, etc.)
    BackendSpecific(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "I/O error: {}", e),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            StoreError::InvalidKey(key) => write!(f, "Invalid key: {}", key),
            StoreError::BackendSpecific(e) => write!(f, "Storage driver error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::IoError(e)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
