// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Attribute value type system for session state
//!
//! Supports the data types request handlers typically park in a session:
//! - Basic types: String, Integer, Float, Boolean, Null, Bytes
//! - Temporal types: DateTime
//! - Collections: List, Map
//! - Application objects: anything implementing [`SessionObject`]
//!
//! Application objects only survive persistence and replication when they
//! provide an encoding and the receiving container can resolve their type tag.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An application-defined attribute value
///
/// The container, not this crate, knows how to rebuild these from bytes;
/// see [`ObjectResolver`].
pub trait SessionObject: Any + Send + Sync + fmt::Debug {
    /// Stable name identifying the concrete type across processes
    fn type_tag(&self) -> &str;

    /// Encoded form, or `None` if the value cannot leave this process
    fn encode(&self) -> Option<Vec<u8>> {
        None
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

/// Class-resolution context supplied by the container
///
/// Rebuilds application objects from their type tag and encoded bytes when
/// a snapshot is restored.
pub trait ObjectResolver: Send + Sync {
    /// Returns `None` when the type tag is unknown or the bytes are malformed
    fn resolve(&self, type_tag: &str, bytes: &[u8]) -> Option<Arc<dyn SessionObject>>;
}

/// Value stored under a session attribute name
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    Object(Arc<dyn SessionObject>),
}

impl AttributeValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<AttributeValue>> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            AttributeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Downcast an application object to its concrete type
    pub fn as_object<T: SessionObject>(&self) -> Option<&T> {
        match self {
            AttributeValue::Object(obj) => obj.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Whether this value (recursively) can be written into a snapshot
    pub fn is_serializable(&self) -> bool {
        match self {
            AttributeValue::List(items) => items.iter().all(AttributeValue::is_serializable),
            AttributeValue::Map(map) => map.values().all(AttributeValue::is_serializable),
            AttributeValue::Object(obj) => obj.encode().is_some(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "NULL",
            AttributeValue::Boolean(_) => "BOOLEAN",
            AttributeValue::Integer(_) => "INTEGER",
            AttributeValue::Float(_) => "FLOAT",
            AttributeValue::String(_) => "STRING",
            AttributeValue::Bytes(_) => "BYTES",
            AttributeValue::DateTime(_) => "DATETIME",
            AttributeValue::List(_) => "LIST",
            AttributeValue::Map(_) => "MAP",
            AttributeValue::Object(_) => "OBJECT",
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            // Objects are equal when they are the same instance or encode identically
            (Object(a), Object(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.type_tag() == b.type_tag()
                        && a.encode().is_some()
                        && a.encode() == b.encode())
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "NULL"),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Float(n) => write!(f, "{}", n),
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            AttributeValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttributeValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            AttributeValue::Object(obj) => write!(f, "<{}>", obj.type_tag()),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Integer(n as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Float(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(dt)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Bytes(bytes)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(items: Vec<AttributeValue>) -> Self {
        AttributeValue::List(items)
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        AttributeValue::Map(map)
    }
}

impl From<Arc<dyn SessionObject>> for AttributeValue {
    fn from(obj: Arc<dyn SessionObject>) -> Self {
        AttributeValue::Object(obj)
    }
}
