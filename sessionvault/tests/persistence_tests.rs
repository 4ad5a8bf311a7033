//! Integration tests for session persistence over a Sled store
//!
//! Covers swap round trips, non-serializable attributes, application
//! objects resolved by the container, and restart persistence.

#[path = "testutils/mod.rs"]
mod testutils;

use sessionvault::storage::{create_storage_driver, StorageType};
use sessionvault::{
    AttributeValue, DriverStore, ManagerConfig, ObjectResolver, SessionManager, SessionObject,
    StaticContainer, Store,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use testutils::session_fixture::SessionFixture;

/// Lives only in memory; has no encoding
#[derive(Debug)]
struct DbConnection;

impl SessionObject for DbConnection {
    fn type_tag(&self) -> &str {
        "db-connection"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, PartialEq)]
struct Basket(Vec<String>);

impl SessionObject for Basket {
    fn type_tag(&self) -> &str {
        "basket"
    }

    fn encode(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(&self.0).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct BasketResolver;

impl ObjectResolver for BasketResolver {
    fn resolve(&self, type_tag: &str, bytes: &[u8]) -> Option<Arc<dyn SessionObject>> {
        match type_tag {
            "basket" => serde_json::from_slice::<Vec<String>>(bytes)
                .ok()
                .map(|items| Arc::new(Basket(items)) as Arc<dyn SessionObject>),
            _ => None,
        }
    }
}

#[test]
fn test_swap_round_trip_drops_non_serializable() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let session = manager.create_session().unwrap();
    session.set_attribute("user", "carol").unwrap();
    session.set_attribute("visits", 12).unwrap();
    session
        .set_attribute("conn", Arc::new(DbConnection) as Arc<dyn SessionObject>)
        .unwrap();
    let id = session.id();
    let created = session.creation_time();

    assert!(manager.swap_out(&session).unwrap());
    assert_eq!(manager.session_count(), 0);
    assert_eq!(fixture.stored_ids(), vec![id.clone()]);
    assert_eq!(fixture.events.count("passivate:"), 1);

    let restored = manager.find_session(&id).unwrap().expect("swapped in");
    assert!(!restored.ptr_eq(&session));
    assert_eq!(restored.creation_time(), created);
    assert_eq!(
        restored.get_attribute("user").unwrap(),
        Some(AttributeValue::from("carol"))
    );
    assert_eq!(
        restored.get_attribute("visits").unwrap(),
        Some(AttributeValue::Integer(12))
    );
    assert!(restored.get_attribute("conn").unwrap().is_none());
    assert_eq!(fixture.events.count("activate:"), 1);
    assert!(fixture.stored_ids().is_empty());
}

#[test]
fn test_objects_resolved_through_container() {
    let temp_dir = tempfile::tempdir().unwrap();
    let driver = create_storage_driver(StorageType::Sled, temp_dir.path()).unwrap();
    let store = Arc::new(DriverStore::open(&*driver, "/shop").unwrap());
    let container =
        StaticContainer::new("/shop").with_resolver(Arc::new(BasketResolver));
    let manager = SessionManager::builder(Arc::new(container))
        .store(store as Arc<dyn Store>)
        .build()
        .unwrap();

    let session = manager.create_session().unwrap();
    let basket = Basket(vec!["tea".to_string(), "cups".to_string()]);
    session
        .set_attribute("basket", Arc::new(basket) as Arc<dyn SessionObject>)
        .unwrap();
    let id = session.id();
    assert!(manager.swap_out(&session).unwrap());

    let restored = manager.find_session(&id).unwrap().unwrap();
    let value = restored.get_attribute("basket").unwrap().unwrap();
    assert_eq!(
        value.as_object::<Basket>(),
        Some(&Basket(vec!["tea".to_string(), "cups".to_string()]))
    );
}

#[test]
fn test_in_use_session_survives_idle_swap() {
    let config = ManagerConfig {
        max_idle_swap: Some(Duration::ZERO),
        ..ManagerConfig::default()
    };
    let fixture = SessionFixture::with_config(config).expect("Failed to create fixture");
    let manager = &fixture.manager;

    let busy = manager.create_session().unwrap();
    busy.access();
    let idle = manager.create_session().unwrap();

    let report = manager.background_process();

    assert_eq!(report.swapped_idle, 1);
    assert_eq!(manager.session_count(), 1);
    assert!(manager.find_session(&busy.id()).unwrap().unwrap().ptr_eq(&busy));
    assert_eq!(fixture.stored_ids(), vec![idle.id()]);
}

#[test]
fn test_sessions_survive_restart() {
    let config = ManagerConfig {
        save_on_restart: true,
        ..ManagerConfig::default()
    };
    let fixture = SessionFixture::with_config(config.clone()).expect("Failed to create fixture");

    fixture.manager.start().unwrap();
    let session = fixture.manager.create_session().unwrap();
    session.set_attribute("theme", "dark").unwrap();
    let id = session.id();
    fixture.manager.stop().unwrap();

    assert_eq!(fixture.manager.session_count(), 0);
    assert_eq!(fixture.stored_ids(), vec![id.clone()]);
    assert_eq!(fixture.events.count("destroyed:"), 0);

    let restarted = fixture.restart(config).expect("Failed to restart");
    restarted.start().unwrap();

    assert_eq!(restarted.session_count(), 1);
    let restored = restarted.find_session(&id).unwrap().unwrap();
    assert_eq!(
        restored.get_attribute("theme").unwrap(),
        Some(AttributeValue::from("dark"))
    );
    restarted.stop().unwrap();
}

#[test]
fn test_corrupt_snapshot_is_not_found() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let session = manager.create_session().unwrap();
    let id = session.id();
    assert!(manager.swap_out(&session).unwrap());

    let mut snapshot = fixture.store.load(&id).unwrap().unwrap();
    snapshot.is_valid = false;
    fixture.store.save(&snapshot).unwrap();

    assert!(manager.find_session(&id).unwrap().is_none());
    assert!(fixture.stored_ids().is_empty());
}

#[test]
fn test_store_purges_stale_snapshots() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let fresh = manager.create_session().unwrap();
    let orphan = manager.create_session().unwrap();
    orphan.set_max_inactive_interval(60);
    assert!(manager.backup(&fresh).unwrap());
    assert!(manager.swap_out(&orphan).unwrap());

    let mut snapshot = fixture.store.load(&orphan.id()).unwrap().unwrap();
    snapshot.last_accessed_time = chrono::Utc::now() - chrono::Duration::seconds(120);
    fixture.store.save(&snapshot).unwrap();

    let report = manager.background_process();
    assert_eq!(report.expired, 0);
    assert_eq!(report.store_expired, 1);
    assert_eq!(fixture.stored_ids(), vec![fresh.id()]);
    assert_eq!(fixture.events.count(&format!("destroyed:{}", orphan.id())), 1);
    assert_eq!(manager.stats().expired, 1);
}
