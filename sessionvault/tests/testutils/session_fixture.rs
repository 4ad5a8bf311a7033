//! Test fixture for SessionVault integration tests
//!
//! Provides an isolated Sled-backed store per fixture, using only the public
//! crate API.

#![allow(dead_code)]

use parking_lot::Mutex;
use sessionvault::storage::{create_storage_driver, StorageType};
use sessionvault::{
    AttributeChange, DriverStore, ManagerConfig, Session, SessionListener, SessionManager,
    StaticContainer, Store,
};
use std::sync::Arc;

/// Everything a listener was told, in order
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<String>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl SessionListener for EventRecorder {
    fn on_created(&self, session: &Session) {
        self.record(format!("created:{}", session.id()));
    }

    fn on_destroyed(&self, session: &Session) {
        self.record(format!("destroyed:{}", session.id()));
    }

    fn on_attribute_changed(&self, _session: &Session, change: &AttributeChange) {
        let kind = match change {
            AttributeChange::Added { .. } => "added",
            AttributeChange::Replaced { .. } => "replaced",
            AttributeChange::Removed { .. } => "removed",
        };
        self.record(format!("{}:{}", kind, change.name()));
    }

    fn on_passivate(&self, session: &Session) {
        self.record(format!("passivate:{}", session.id()));
    }

    fn on_activate(&self, session: &Session) {
        self.record(format!("activate:{}", session.id()));
    }

    fn on_id_changed(&self, session: &Session, old_id: &str) {
        self.record(format!("id_changed:{}->{}", old_id, session.id()));
    }
}

/// Manager plus store in a private temp directory
pub struct SessionFixture {
    pub manager: Arc<SessionManager>,
    pub store: Arc<DriverStore>,
    pub events: Arc<EventRecorder>,
    scope: String,
    _temp_dir: tempfile::TempDir,
}

impl SessionFixture {
    /// Default configuration with a Sled store attached
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_dir = tempfile::tempdir()?;
        let driver = create_storage_driver(StorageType::Sled, temp_dir.path().join("sessions"))?;

        // Unique scope so fixtures never share keys
        let scope = format!("/app_{}", fastrand::u64(..));
        let store = Arc::new(DriverStore::open(&*driver, scope.clone())?);
        let events = EventRecorder::new();

        let container = StaticContainer::new(scope.clone())
            .with_listener(events.clone() as Arc<dyn SessionListener>);
        let manager = SessionManager::builder(Arc::new(container))
            .config(config)
            .store(store.clone() as Arc<dyn Store>)
            .build()?;

        Ok(Self {
            manager,
            store,
            events,
            scope,
            _temp_dir: temp_dir,
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// A second manager over the same store, as after a restart
    pub fn restart(
        &self,
        config: ManagerConfig,
    ) -> Result<Arc<SessionManager>, Box<dyn std::error::Error>> {
        let container = StaticContainer::new(self.scope.clone())
            .with_listener(self.events.clone() as Arc<dyn SessionListener>);
        Ok(SessionManager::builder(Arc::new(container))
            .config(config)
            .store(self.store.clone() as Arc<dyn Store>)
            .build()?)
    }

    pub fn stored_ids(&self) -> Vec<String> {
        let mut ids = self.store.keys().unwrap_or_default();
        ids.sort();
        ids
    }
}
