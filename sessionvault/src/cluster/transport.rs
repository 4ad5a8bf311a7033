// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cluster transport abstraction
//!
//! Replication is split into a sending half and a receiving half so real
//! transports can pool connections on one side and buffer on the other.
//! [`LocalCluster`] is an in-process hub that connects several nodes for
//! embedding and tests.

use crate::error::{SessionError, SessionResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Messages held per node before the oldest are dropped
pub const LOCAL_INBOX_CAPACITY: usize = 10_000;

/// One replicated session snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationMessage {
    /// Scope the session belongs to
    pub sender_id: String,
    /// Encoded `SessionSnapshot`
    pub payload: Vec<u8>,
}

/// Outbound half of a cluster transport
pub trait ClusterSender: Send + Sync {
    /// Deliver a payload to every other member. Delivery is best effort.
    fn send(&self, message: ReplicationMessage) -> SessionResult<()>;
}

/// Inbound half of a cluster transport
pub trait ClusterReceiver: Send + Sync {
    /// Drain every message received since the last call
    fn receive(&self) -> Vec<ReplicationMessage>;
}

type Inbox = Arc<Mutex<VecDeque<ReplicationMessage>>>;

/// In-process hub connecting named nodes
#[derive(Default)]
pub struct LocalCluster {
    members: Mutex<HashMap<String, Inbox>>,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the hub as `node`. Joining twice with one name shares the inbox.
    pub fn join(self: &Arc<Self>, node: impl Into<String>) -> LocalClusterEndpoint {
        let node = node.into();
        let inbox = self
            .members
            .lock()
            .entry(node.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();
        log::debug!("Node '{}' joined the local cluster", node);
        LocalClusterEndpoint {
            node,
            cluster: Arc::clone(self),
            inbox,
        }
    }

    /// Remove a node; pending messages for it are discarded
    pub fn leave(&self, node: &str) -> bool {
        self.members.lock().remove(node).is_some()
    }

    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.members.lock().keys().cloned().collect();
        members.sort();
        members
    }

    fn broadcast(&self, from: &str, message: &ReplicationMessage) -> usize {
        let targets: Vec<(String, Inbox)> = self
            .members
            .lock()
            .iter()
            .filter(|(node, _)| node.as_str() != from)
            .map(|(node, inbox)| (node.clone(), Arc::clone(inbox)))
            .collect();

        for (node, inbox) in &targets {
            let mut inbox = inbox.lock();
            if inbox.len() >= LOCAL_INBOX_CAPACITY {
                inbox.pop_front();
                log::warn!("Inbox of node '{}' is full, dropped the oldest message", node);
            }
            inbox.push_back(message.clone());
        }
        targets.len()
    }
}

/// One node's connection to a [`LocalCluster`]
#[derive(Clone)]
pub struct LocalClusterEndpoint {
    node: String,
    cluster: Arc<LocalCluster>,
    inbox: Inbox,
}

impl LocalClusterEndpoint {
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Messages waiting to be received
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

impl ClusterSender for LocalClusterEndpoint {
    fn send(&self, message: ReplicationMessage) -> SessionResult<()> {
        if !self.cluster.members.lock().contains_key(&self.node) {
            return Err(SessionError::Cluster(format!(
                "node '{}' is no longer a cluster member",
                self.node
            )));
        }
        let delivered = self.cluster.broadcast(&self.node, &message);
        log::trace!(
            "Node '{}' sent {} bytes to {} peers",
            self.node,
            message.payload.len(),
            delivered
        );
        Ok(())
    }
}

impl ClusterReceiver for LocalClusterEndpoint {
    fn receive(&self) -> Vec<ReplicationMessage> {
        self.inbox.lock().drain(..).collect()
    }
}

impl std::fmt::Debug for LocalClusterEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClusterEndpoint")
            .field("node", &self.node)
            .field("pending", &self.pending())
            .finish()
    }
}
