// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Best-effort session replication
//!
//! New sessions are captured, encoded and broadcast to peers. Inbound
//! snapshots addressed to the same scope are installed into the local
//! registry, replacing any session with the same id. There is no ordering,
//! acknowledgment or conflict resolution.

use super::transport::{ClusterReceiver, ClusterSender, LocalClusterEndpoint, ReplicationMessage};
use crate::session::models::Session;
use crate::session::provider::SessionProvider;
use crate::session::snapshot::SessionSnapshot;
use crate::session::value::ObjectResolver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Replication counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub sent: u64,
    pub send_failures: u64,
    pub installed: u64,
    pub ignored: u64,
    pub malformed: u64,
}

pub struct ClusterReplicator {
    sender_id: String,
    sender: Arc<dyn ClusterSender>,
    receiver: Arc<dyn ClusterReceiver>,
    sent: AtomicU64,
    send_failures: AtomicU64,
    installed: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

impl ClusterReplicator {
    pub fn new(
        sender_id: impl Into<String>,
        sender: Arc<dyn ClusterSender>,
        receiver: Arc<dyn ClusterReceiver>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender,
            receiver,
            sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            installed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    /// Replicator using one local endpoint for both directions
    pub fn local(sender_id: impl Into<String>, endpoint: LocalClusterEndpoint) -> Self {
        let endpoint = Arc::new(endpoint);
        Self::new(sender_id, endpoint.clone(), endpoint)
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Broadcast a snapshot of `session`. Failures are logged, never raised.
    pub fn replicate(&self, session: &Session) {
        let (snapshot, _) = SessionSnapshot::capture(session);
        let payload = match snapshot.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Failed to encode session {} for replication: {}", snapshot.id, e);
                return;
            }
        };

        let message = ReplicationMessage {
            sender_id: self.sender_id.clone(),
            payload,
        };
        match self.sender.send(message) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                log::trace!("Replicated session {}", snapshot.id);
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Failed to replicate session {}: {}", snapshot.id, e);
            }
        }
    }

    /// Install every pending inbound snapshot for this scope into `provider`.
    /// Returns the number of sessions installed.
    pub fn receive_into(
        &self,
        provider: &dyn SessionProvider,
        resolver: Option<&dyn ObjectResolver>,
    ) -> usize {
        let mut installed = 0;
        for message in self.receiver.receive() {
            if message.sender_id != self.sender_id {
                self.ignored.fetch_add(1, Ordering::Relaxed);
                log::trace!("Ignoring replication message for '{}'", message.sender_id);
                continue;
            }

            let snapshot = match SessionSnapshot::decode(&message.payload) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Dropping malformed replication message: {}", e);
                    continue;
                }
            };

            let session = provider.create_empty_session();
            snapshot.restore_into(&session, resolver);
            session.with_state_mut(|state| state.is_valid = true);
            provider.add(session.clone());
            session.fire_activate();

            installed += 1;
            log::debug!("Installed replicated session {}", snapshot.id);
        }

        self.installed.fetch_add(installed as u64, Ordering::Relaxed);
        installed
    }

    pub fn stats(&self) -> ReplicationStats {
        ReplicationStats {
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            installed: self.installed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ClusterReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterReplicator")
            .field("sender_id", &self.sender_id)
            .field("stats", &self.stats())
            .finish()
    }
}
