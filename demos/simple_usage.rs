// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Simple SessionVault usage
//!
//! Two nodes of a shop share new sessions over an in-process cluster; the
//! first node swaps idle sessions out to a Sled store and brings them back
//! on demand.
//!
//! Run with: cargo run --example simple_usage

use sessionvault::cluster::{ClusterReplicator, LocalCluster};
use sessionvault::storage::{create_storage_driver, StorageType};
use sessionvault::{
    DriverStore, ManagerConfig, Session, SessionListener, SessionManager, StaticContainer, Store,
};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

struct AuditLog;

impl SessionListener for AuditLog {
    fn on_created(&self, session: &Session) {
        log::info!("created {}", session.id());
    }

    fn on_destroyed(&self, session: &Session) {
        log::info!("destroyed {}", session.id());
    }

    fn on_passivate(&self, session: &Session) {
        log::info!("passivating {}", session.id());
    }

    fn on_activate(&self, session: &Session) {
        log::info!("activated {}", session.id());
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("=== SessionVault Simple Usage ===\n");

    // Step 1: Storage
    println!("1. Opening session store...");
    let data_dir = tempfile::tempdir()?;
    let driver = create_storage_driver(StorageType::Sled, data_dir.path().join("sessions"))?;
    let store = Arc::new(DriverStore::open(&*driver, "/shop")?);
    println!("   ✓ Store ready\n");

    // Step 2: Two nodes on one cluster
    println!("2. Starting two nodes...");
    let cluster = LocalCluster::new();
    let config = ManagerConfig {
        max_idle_swap: Some(Duration::from_secs(600)),
        cluster_poll_interval: Duration::from_millis(100),
        ..ManagerConfig::default()
    };
    let node_a = SessionManager::builder(Arc::new(
        StaticContainer::new("/shop").with_listener(Arc::new(AuditLog)),
    ))
    .config(config.clone())
    .store(store.clone() as Arc<dyn Store>)
    .replicator(ClusterReplicator::local("/shop", cluster.join("node-a")))
    .build()?;
    let node_b = SessionManager::builder(Arc::new(StaticContainer::new("/shop")))
        .config(ManagerConfig {
            max_idle_swap: None,
            ..config
        })
        .replicator(ClusterReplicator::local("/shop", cluster.join("node-b")))
        .build()?;
    node_a.start()?;
    node_b.start()?;
    println!("   ✓ Nodes started\n");

    // Step 3: A request on node A
    println!("3. Handling a request...");
    let session = node_a.create_session()?;
    session.access();
    session.set_attribute("user", "alice")?;
    session.set_attribute("cart_items", 3)?;
    session.end_access();
    println!("   ✓ Session {}\n", session.id());

    // Step 4: Node B sees the replicated session
    std::thread::sleep(Duration::from_millis(300));
    let replica = node_b.find_session(&session.id())?;
    match replica {
        Some(replica) => println!(
            "4. Replica on node B carries {} attributes\n",
            replica.attributes().len()
        ),
        None => println!("4. Replica has not arrived on node B yet\n"),
    }

    // Step 5: Swap out and back in
    println!("5. Swapping the session out and back in...");
    node_a.swap_out(&session)?;
    println!("   Stored snapshots: {}", store.size()?);
    let restored = node_a
        .find_session(&session.id())?
        .ok_or("session was not restored")?;
    println!("   ✓ Restored user = {:?}\n", restored.get_attribute("user")?);

    // Step 6: Statistics and shutdown
    println!("6. Statistics: {:?}\n", node_a.stats());
    node_a.stop()?;
    node_b.stop()?;
    println!("✓ Done");
    Ok(())
}
