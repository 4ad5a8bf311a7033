// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cluster replication of new sessions

pub mod replicator;
pub mod transport;

pub use replicator::{ClusterReplicator, ReplicationStats};
pub use transport::{
    ClusterReceiver, ClusterSender, LocalCluster, LocalClusterEndpoint, ReplicationMessage,
    LOCAL_INBOX_CAPACITY,
};
