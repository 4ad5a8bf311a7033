// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Versioned session snapshot codec
//!
//! A snapshot is the scalar fields of a session plus every attribute that can
//! be serialized. Encoded layout:
//!
//! ```text
//! +-------+---------+----------------------+
//! | SVSN  | version | bincode(snapshot)    |
//! | 4 B   | 1 B     | ...                  |
//! +-------+---------+----------------------+
//! ```
//!
//! Attributes that cannot be serialized are left out of the snapshot and
//! reported back to the caller; the live session keeps them.

use crate::session::models::Session;
use crate::session::value::{AttributeValue, ObjectResolver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SVSN";
pub const SNAPSHOT_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode snapshot: {0}")]
    Decode(String),

    #[error("Not a session snapshot (bad magic)")]
    BadMagic,

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u8),
}

/// Serializable mirror of [`AttributeValue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    List(Vec<SnapshotValue>),
    Map(BTreeMap<String, SnapshotValue>),
    Object { type_tag: String, bytes: Vec<u8> },
}

impl SnapshotValue {
    /// Convert a live value; `None` if any part of it cannot be serialized
    pub fn capture(value: &AttributeValue) -> Option<Self> {
        Some(match value {
            AttributeValue::Null => SnapshotValue::Null,
            AttributeValue::Boolean(b) => SnapshotValue::Boolean(*b),
            AttributeValue::Integer(i) => SnapshotValue::Integer(*i),
            AttributeValue::Float(f) => SnapshotValue::Float(*f),
            AttributeValue::String(s) => SnapshotValue::String(s.clone()),
            AttributeValue::Bytes(b) => SnapshotValue::Bytes(b.clone()),
            AttributeValue::DateTime(dt) => SnapshotValue::DateTime(*dt),
            AttributeValue::List(items) => SnapshotValue::List(
                items
                    .iter()
                    .map(SnapshotValue::capture)
                    .collect::<Option<Vec<_>>>()?,
            ),
            AttributeValue::Map(map) => SnapshotValue::Map(
                map.iter()
                    .map(|(k, v)| SnapshotValue::capture(v).map(|v| (k.clone(), v)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
            AttributeValue::Object(obj) => SnapshotValue::Object {
                type_tag: obj.type_tag().to_string(),
                bytes: obj.encode()?,
            },
        })
    }

    /// Rebuild a live value; `None` if an object's type cannot be resolved
    pub fn restore(&self, resolver: Option<&dyn ObjectResolver>) -> Option<AttributeValue> {
        Some(match self {
            SnapshotValue::Null => AttributeValue::Null,
            SnapshotValue::Boolean(b) => AttributeValue::Boolean(*b),
            SnapshotValue::Integer(i) => AttributeValue::Integer(*i),
            SnapshotValue::Float(f) => AttributeValue::Float(*f),
            SnapshotValue::String(s) => AttributeValue::String(s.clone()),
            SnapshotValue::Bytes(b) => AttributeValue::Bytes(b.clone()),
            SnapshotValue::DateTime(dt) => AttributeValue::DateTime(*dt),
            SnapshotValue::List(items) => AttributeValue::List(
                items
                    .iter()
                    .map(|item| item.restore(resolver))
                    .collect::<Option<Vec<_>>>()?,
            ),
            SnapshotValue::Map(map) => AttributeValue::Map(
                map.iter()
                    .map(|(k, v)| v.restore(resolver).map(|v| (k.clone(), v)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
            SnapshotValue::Object { type_tag, bytes } => {
                AttributeValue::Object(resolver?.resolve(type_tag, bytes)?)
            }
        })
    }
}

/// Point-in-time copy of a session, independent of the live object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub creation_time: DateTime<Utc>,
    pub last_accessed_time: DateTime<Utc>,
    pub this_accessed_time: DateTime<Utc>,
    pub max_inactive_interval: i32,
    pub is_new: bool,
    pub is_valid: bool,
    /// Sorted by name
    pub attributes: Vec<(String, SnapshotValue)>,
}

impl SessionSnapshot {
    /// Copy a live session. Returns the snapshot and the names of attributes
    /// that had to be left out.
    pub fn capture(session: &Session) -> (Self, Vec<String>) {
        let (mut snapshot, dropped) = session.with_state(|state| {
            let mut dropped = Vec::new();
            let attributes = state
                .attributes
                .iter()
                .filter_map(|(name, value)| match SnapshotValue::capture(value) {
                    Some(captured) => Some((name.clone(), captured)),
                    None => {
                        dropped.push(name.clone());
                        None
                    }
                })
                .collect();

            let snapshot = SessionSnapshot {
                id: state.id.clone(),
                creation_time: state.creation_time,
                last_accessed_time: state.last_accessed_time,
                this_accessed_time: state.this_accessed_time,
                max_inactive_interval: state.max_inactive_interval,
                is_new: state.is_new,
                is_valid: state.is_valid,
                attributes,
            };
            (snapshot, dropped)
        });

        snapshot.attributes.sort_by(|a, b| a.0.cmp(&b.0));
        for name in &dropped {
            log::warn!(
                "Attribute '{}' of session {} is not serializable and was left out of the snapshot",
                name,
                snapshot.id
            );
        }
        (snapshot, dropped)
    }

    /// Idle time measured at `now`
    pub fn idle_time_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_accessed_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// The snapshot is invalid or its own timeout has elapsed
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_valid {
            return true;
        }
        self.max_inactive_interval >= 0
            && self.idle_time_at(now) >= Duration::from_secs(self.max_inactive_interval as u64)
    }

    /// Copy this snapshot into a session shell. Returns the names of
    /// attributes whose objects could not be resolved.
    pub fn restore_into(
        &self,
        session: &Session,
        resolver: Option<&dyn ObjectResolver>,
    ) -> Vec<String> {
        let mut dropped = Vec::new();
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(name, value)| match value.restore(resolver) {
                Some(restored) => Some((name.clone(), restored)),
                None => {
                    dropped.push(name.clone());
                    None
                }
            })
            .collect();

        session.with_state_mut(|state| {
            state.id = self.id.clone();
            state.creation_time = self.creation_time;
            state.last_accessed_time = self.last_accessed_time;
            state.this_accessed_time = self.this_accessed_time;
            state.max_inactive_interval = self.max_inactive_interval;
            state.is_new = self.is_new;
            state.is_valid = self.is_valid;
            state.expiring = false;
            state.access_count = 0;
            state.attributes = attributes;
        });

        for name in &dropped {
            log::warn!(
                "Attribute '{}' of session {} could not be resolved and was dropped",
                name,
                self.id
            );
        }
        dropped
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let body = bincode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(&SNAPSHOT_MAGIC);
        bytes.push(SNAPSHOT_FORMAT_VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_LEN || bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = bytes[SNAPSHOT_MAGIC.len()];
        if version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::listener::EventDispatcher;
    use crate::session::models::SessionState;
    use crate::session::value::SessionObject;
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Token(String);

    impl SessionObject for Token {
        fn type_tag(&self) -> &str {
            "token"
        }

        fn encode(&self) -> Option<Vec<u8>> {
            Some(self.0.as_bytes().to_vec())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Handle;

    impl SessionObject for Handle {
        fn type_tag(&self) -> &str {
            "handle"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct TokenResolver;

    impl ObjectResolver for TokenResolver {
        fn resolve(&self, type_tag: &str, bytes: &[u8]) -> Option<Arc<dyn SessionObject>> {
            match type_tag {
                "token" => Some(Arc::new(Token(String::from_utf8(bytes.to_vec()).ok()?))),
                _ => None,
            }
        }
    }

    fn session_with_attributes() -> Session {
        let mut state = SessionState::default();
        state.initialize("ABC".to_string(), 1800);
        let session = Session::from_state(state, Arc::new(EventDispatcher::new()));
        session.set_attribute("user", "alice").unwrap();
        session.set_attribute("visits", 3).unwrap();
        session
            .set_attribute("token", Arc::new(Token("t-1".into())) as Arc<dyn SessionObject>)
            .unwrap();
        session
            .set_attribute("conn", Arc::new(Handle) as Arc<dyn SessionObject>)
            .unwrap();
        session
    }

    fn shell() -> Session {
        Session::from_state(SessionState::default(), Arc::new(EventDispatcher::new()))
    }

    #[test]
    fn test_capture_drops_unserializable_only_from_snapshot() {
        let session = session_with_attributes();
        let (snapshot, dropped) = SessionSnapshot::capture(&session);

        assert_eq!(dropped, vec!["conn".to_string()]);
        assert_eq!(snapshot.attributes.len(), 3);
        assert!(session.get_attribute("conn").unwrap().is_some());

        let names: Vec<&str> = snapshot.attributes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["token", "user", "visits"]);
    }

    #[test]
    fn test_encode_decode_restore() {
        let session = session_with_attributes();
        let (snapshot, _) = SessionSnapshot::capture(&session);
        let decoded = SessionSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = shell();
        let unresolved = decoded.restore_into(&restored, Some(&TokenResolver));
        assert!(unresolved.is_empty());
        assert_eq!(restored.id(), "ABC");
        assert!(restored.is_valid());
        assert_eq!(
            restored.get_attribute("user").unwrap(),
            Some(AttributeValue::from("alice"))
        );
        let token = restored.get_attribute("token").unwrap().unwrap();
        assert_eq!(token.as_object::<Token>().map(|t| t.0.as_str()), Some("t-1"));
        assert!(restored.get_attribute("conn").unwrap().is_none());
    }

    #[test]
    fn test_restore_without_resolver_drops_objects() {
        let (snapshot, _) = SessionSnapshot::capture(&session_with_attributes());
        let restored = shell();
        let unresolved = snapshot.restore_into(&restored, None);
        assert_eq!(unresolved, vec!["token".to_string()]);
        assert_eq!(restored.attributes().len(), 2);
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        assert_eq!(SessionSnapshot::decode(b"nope"), Err(SnapshotError::BadMagic));

        let (snapshot, _) = SessionSnapshot::capture(&session_with_attributes());
        let mut bytes = snapshot.encode().unwrap();
        bytes[4] = 9;
        assert_eq!(
            SessionSnapshot::decode(&bytes),
            Err(SnapshotError::UnsupportedVersion(9))
        );

        bytes[4] = SNAPSHOT_FORMAT_VERSION;
        bytes.truncate(12);
        assert!(matches!(
            SessionSnapshot::decode(&bytes),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn test_staleness() {
        let (mut snapshot, _) = SessionSnapshot::capture(&session_with_attributes());
        let now = Utc::now();
        assert!(!snapshot.is_stale_at(now));

        snapshot.max_inactive_interval = 10;
        assert!(snapshot.is_stale_at(now + chrono::Duration::seconds(11)));

        snapshot.max_inactive_interval = -1;
        assert!(!snapshot.is_stale_at(now + chrono::Duration::days(365)));

        snapshot.is_valid = false;
        assert!(snapshot.is_stale_at(now));
    }
}
