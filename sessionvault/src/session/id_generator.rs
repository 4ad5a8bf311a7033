// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session identifier generation
//!
//! Identifiers are a one-way digest over fresh random bytes, rendered as
//! upper-case hex, optionally followed by `.route` so a load balancer can pin
//! follow-up requests to the node that owns the session.

use crate::error::{SessionError, SessionResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;

/// Minimum number of random bytes per identifier
pub const MIN_SESSION_ID_LENGTH: usize = 16;

/// Digest used when the configured algorithm is unknown
pub const DEFAULT_DIGEST_ALGORITHM: &str = "SHA-256";

/// One-way digest applied to the random bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

static ALGORITHMS: Lazy<HashMap<&'static str, DigestAlgorithm>> = Lazy::new(|| {
    HashMap::from([
        ("SHA-256", DigestAlgorithm::Sha256),
        ("SHA256", DigestAlgorithm::Sha256),
        ("SHA-512", DigestAlgorithm::Sha512),
        ("SHA512", DigestAlgorithm::Sha512),
        ("BLAKE3", DigestAlgorithm::Blake3),
    ])
});

impl DigestAlgorithm {
    /// Look up an algorithm by name, case-insensitively
    pub fn lookup(name: &str) -> Option<Self> {
        ALGORITHMS.get(name.trim().to_uppercase().as_str()).copied()
    }

    /// Resolve a configured name, falling back to the default digest
    pub fn resolve(name: &str) -> SessionResult<Self> {
        if let Some(algorithm) = Self::lookup(name) {
            return Ok(algorithm);
        }
        log::warn!(
            "Digest algorithm '{}' is not available, falling back to {}",
            name,
            DEFAULT_DIGEST_ALGORITHM
        );
        Self::lookup(DEFAULT_DIGEST_ALGORITHM).ok_or_else(|| {
            SessionError::Configuration(format!(
                "default digest algorithm {} is not available",
                DEFAULT_DIGEST_ALGORITHM
            ))
        })
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
            DigestAlgorithm::Blake3 => blake3::hash(bytes).as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
            DigestAlgorithm::Blake3 => "BLAKE3",
        };
        write!(f, "{}", name)
    }
}

/// Produces unpredictable session identifiers
pub struct SessionIdGenerator {
    rng: Mutex<StdRng>,
    length: usize,
    algorithm: DigestAlgorithm,
    route_suffix: Option<String>,
}

impl SessionIdGenerator {
    /// Build a generator.
    ///
    /// # Arguments
    /// * `length` - random bytes per id, at least [`MIN_SESSION_ID_LENGTH`]
    /// * `algorithm` - digest name; unknown names fall back to SHA-256
    /// * `route_suffix` - node name appended as `.route`, if any
    pub fn new(length: usize, algorithm: &str, route_suffix: Option<String>) -> SessionResult<Self> {
        if length < MIN_SESSION_ID_LENGTH {
            return Err(SessionError::Configuration(format!(
                "session id length {} is below the minimum of {} bytes",
                length, MIN_SESSION_ID_LENGTH
            )));
        }
        let algorithm = DigestAlgorithm::resolve(algorithm)?;
        let route_suffix = route_suffix.filter(|route| !route.is_empty());

        Ok(Self {
            rng: Mutex::new(StdRng::from_entropy()),
            length,
            algorithm,
            route_suffix,
        })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn route_suffix(&self) -> Option<&str> {
        self.route_suffix.as_deref()
    }

    /// Generate a new identifier
    pub fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.length];
        self.rng.lock().fill_bytes(&mut bytes);

        let mut id = hex::encode_upper(self.algorithm.digest(&bytes));
        if let Some(route) = &self.route_suffix {
            id.push('.');
            id.push_str(route);
        }
        id
    }
}

impl fmt::Debug for SessionIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdGenerator")
            .field("length", &self.length)
            .field("algorithm", &self.algorithm)
            .field("route_suffix", &self.route_suffix)
            .finish()
    }
}

/// Strip a `.route` suffix from an identifier
pub fn strip_route(id: &str) -> &str {
    match id.find('.') {
        Some(pos) => &id[..pos],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let generator = SessionIdGenerator::new(16, "SHA-256", None).unwrap();
        let ids: HashSet<String> = (0..10_000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_id_format() {
        let generator = SessionIdGenerator::new(16, "sha-256", None).unwrap();
        let id = generator.generate();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

        let blake = SessionIdGenerator::new(32, "blake3", None).unwrap();
        assert_eq!(blake.algorithm(), DigestAlgorithm::Blake3);
        assert_eq!(blake.generate().len(), 64);

        let sha512 = SessionIdGenerator::new(16, "SHA-512", None).unwrap();
        assert_eq!(sha512.generate().len(), 128);
    }

    #[test]
    fn test_route_suffix() {
        let generator = SessionIdGenerator::new(16, "SHA-256", Some("node1".to_string())).unwrap();
        let id = generator.generate();
        assert!(id.ends_with(".node1"));
        assert_eq!(strip_route(&id).len(), 64);
        assert_eq!(strip_route("ABC"), "ABC");

        let empty = SessionIdGenerator::new(16, "SHA-256", Some(String::new())).unwrap();
        assert!(empty.route_suffix().is_none());
    }

    #[test]
    fn test_unknown_algorithm_falls_back() {
        let generator = SessionIdGenerator::new(16, "MD2", None).unwrap();
        assert_eq!(generator.algorithm(), DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_short_length_is_fatal() {
        let result = SessionIdGenerator::new(8, "SHA-256", None);
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }
}
