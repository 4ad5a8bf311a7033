// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session manager configuration and policies

use crate::error::{SessionError, SessionResult};
use crate::session::id_generator::{DEFAULT_DIGEST_ALGORITHM, MIN_SESSION_ID_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for one session manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Session timeout in seconds; `None` uses the container default,
    /// negative values never expire
    pub max_inactive_interval: Option<i32>,

    /// Ceiling on sessions held in memory; `None` is unlimited
    pub max_active_sessions: Option<usize>,

    /// How often the background sweeper runs
    pub check_interval: Duration,

    /// Sessions idle for less than this are never swapped out
    pub min_idle_swap: Option<Duration>,

    /// Sessions idle for longer than this are swapped out
    pub max_idle_swap: Option<Duration>,

    /// Sessions idle for longer than this are backed up to the store
    pub max_idle_backup: Option<Duration>,

    /// Random bytes per session id
    pub session_id_length: usize,

    /// Digest applied to the random bytes
    pub digest_algorithm: String,

    /// Node name appended to session ids as `.route`
    pub route_suffix: Option<String>,

    /// Number of cleared session shells kept for reuse
    pub recycle_pool_size: usize,

    /// Write every session to the store on stop and reload on start
    pub save_on_restart: bool,

    /// How often inbound replication messages are drained
    pub cluster_poll_interval: Duration,

    /// Bounded wait for background tasks when stopping
    pub shutdown_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_inactive_interval: None,
            max_active_sessions: None,
            check_interval: Duration::from_secs(60),
            min_idle_swap: None,
            max_idle_swap: None,
            max_idle_backup: None,
            session_id_length: MIN_SESSION_ID_LENGTH,
            digest_algorithm: DEFAULT_DIGEST_ALGORITHM.to_string(),
            route_suffix: None,
            recycle_pool_size: 64,
            save_on_restart: false,
            cluster_poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ManagerConfig {
    /// Swap idle sessions out after five minutes, back them up after one
    pub fn persistent() -> Self {
        Self {
            min_idle_swap: Some(Duration::from_secs(60)),
            max_idle_swap: Some(Duration::from_secs(300)),
            max_idle_backup: Some(Duration::from_secs(60)),
            save_on_restart: true,
            ..Self::default()
        }
    }

    /// Load from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> SessionResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Whether any setting needs a store
    pub fn requires_store(&self) -> bool {
        self.min_idle_swap.is_some()
            || self.max_idle_swap.is_some()
            || self.max_idle_backup.is_some()
            || self.save_on_restart
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.session_id_length < MIN_SESSION_ID_LENGTH {
            return Err(SessionError::Configuration(format!(
                "session_id_length must be at least {}",
                MIN_SESSION_ID_LENGTH
            )));
        }
        if self.check_interval.is_zero() {
            return Err(SessionError::Configuration(
                "check_interval must be greater than zero".to_string(),
            ));
        }
        if self.cluster_poll_interval.is_zero() {
            return Err(SessionError::Configuration(
                "cluster_poll_interval must be greater than zero".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_idle_swap, self.max_idle_swap) {
            if min > max {
                return Err(SessionError::Configuration(format!(
                    "min_idle_swap ({:?}) exceeds max_idle_swap ({:?})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ManagerConfig::default();
        config.validate().unwrap();
        assert!(!config.requires_store());
        assert_eq!(config.check_interval, Duration::from_secs(60));

        let persistent = ManagerConfig::persistent();
        persistent.validate().unwrap();
        assert!(persistent.requires_store());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ManagerConfig::from_json_str(
            r#"{ "max_active_sessions": 500, "route_suffix": "node-a" }"#,
        )
        .unwrap();
        assert_eq!(config.max_active_sessions, Some(500));
        assert_eq!(config.route_suffix.as_deref(), Some("node-a"));
        assert_eq!(config.recycle_pool_size, 64);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let config = ManagerConfig {
            max_idle_swap: Some(Duration::from_secs(120)),
            ..ManagerConfig::default()
        };
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert_eq!(ManagerConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let swap_window = ManagerConfig {
            min_idle_swap: Some(Duration::from_secs(600)),
            max_idle_swap: Some(Duration::from_secs(60)),
            ..ManagerConfig::default()
        };
        assert!(swap_window.validate().is_err());

        let short_ids = ManagerConfig {
            session_id_length: 4,
            ..ManagerConfig::default()
        };
        assert!(short_ids.validate().is_err());

        assert!(ManagerConfig::from_json_str("{ not json").is_err());
    }
}
