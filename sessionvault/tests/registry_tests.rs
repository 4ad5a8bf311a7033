//! Integration tests for the session registry
//!
//! Covers create/find, removal from memory and store, the active-session
//! ceiling under concurrency, listener notifications, and id rotation.

#[path = "testutils/mod.rs"]
mod testutils;

use sessionvault::{
    ManagerConfig, SessionError, SessionManager, SessionProvider, StaticContainer,
};
use std::sync::{Arc, Barrier};
use std::thread;
use testutils::session_fixture::{EventRecorder, SessionFixture};

#[test]
fn test_create_then_find_returns_same_session() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let session = manager.create_session().unwrap();
    let found = manager
        .find_session(&session.id())
        .unwrap()
        .expect("session should be registered");

    assert!(found.ptr_eq(&session));
    assert!(found.is_valid());
    assert!(manager.find_session("NOPE").unwrap().is_none());
}

#[test]
fn test_remove_clears_memory_and_store() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let session = manager.create_session().unwrap();
    session.set_attribute("user", "bob").unwrap();
    let id = session.id();
    assert!(manager.backup(&session).unwrap());
    assert_eq!(fixture.stored_ids(), vec![id.clone()]);

    manager.remove(&session);

    assert!(manager.find_session(&id).unwrap().is_none());
    assert!(fixture.stored_ids().is_empty());
}

#[test]
fn test_ceiling_of_two_under_concurrent_creates() {
    let manager = SessionManager::builder(Arc::new(StaticContainer::new("/ceiling")))
        .config(ManagerConfig {
            max_active_sessions: Some(2),
            ..ManagerConfig::default()
        })
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(3));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.create_session().map(|session| session.id())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let created = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SessionError::TooManyActiveSessions { max: 2 })))
        .count();

    assert_eq!(created, 2);
    assert_eq!(rejected, 1);
    assert_eq!(manager.session_count(), 2);
    assert_eq!(manager.stats().rejected, 1);
}

#[test]
fn test_listeners_see_lifecycle() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;
    let local = EventRecorder::new();

    let session = manager.create_session().unwrap();
    session.add_listener(local.clone());
    session.set_attribute("a", 1).unwrap();
    session.set_attribute("a", 2).unwrap();
    session.remove_attribute("a").unwrap();
    session.set_attribute("b", "kept").unwrap();
    let id = session.id();

    manager.expire_session(&session);

    assert_eq!(
        fixture.events.events(),
        vec![
            format!("created:{}", id),
            "added:a".to_string(),
            "replaced:a".to_string(),
            "removed:a".to_string(),
            "added:b".to_string(),
            format!("destroyed:{}", id),
            "removed:b".to_string(),
        ]
    );
    assert_eq!(local.count("removed:b"), 1);
    assert!(!session.is_valid());
    assert!(matches!(
        session.get_attribute("b"),
        Err(SessionError::InvalidSession(_))
    ));
}

#[test]
fn test_change_session_id_keeps_state() {
    let fixture = SessionFixture::new().expect("Failed to create fixture");
    let manager = &fixture.manager;

    let session = manager.create_session().unwrap();
    session.set_attribute("cart", 7).unwrap();
    let old_id = session.id();

    let new_id = manager.change_session_id(&session).unwrap();

    let found = manager.find_session(&new_id).unwrap().unwrap();
    assert_eq!(found.get_attribute("cart").unwrap().unwrap().as_integer(), Some(7));
    assert!(manager.find_session(&old_id).unwrap().is_none());
    assert_eq!(
        fixture.events.count(&format!("id_changed:{}->{}", old_id, new_id)),
        1
    );
}

#[test]
fn test_provider_trait_object() {
    let manager = SessionManager::builder(Arc::new(StaticContainer::new("/provider")))
        .build()
        .unwrap();
    let provider: Arc<dyn SessionProvider> = manager.clone();

    let session = provider.create_session().unwrap();
    assert_eq!(provider.scope(), "/provider");
    assert_eq!(provider.session_count(), 1);
    assert!(provider.find_session(&session.id()).unwrap().is_some());

    let shell = provider.create_empty_session();
    assert!(!shell.is_valid());
    assert_eq!(provider.session_count(), 1);
}
