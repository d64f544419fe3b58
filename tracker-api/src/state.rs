//! Shared application state for the API server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, broadcast};
use tracker::io::config::{TrackerConfig, load_config};
use tracker::io::init::{TrackerPaths, ensure_layout};
use tracker::io::store::JsonStore;
use tracker::service::TestLifecycle;

/// Events broadcast to SSE clients when stored records change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    TestChanged { test_id: String },
    TestRemoved { test_id: String },
    ConfigChanged,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub paths: TrackerPaths,
    /// Requests run one at a time against the store.
    pub service: Arc<Mutex<TestLifecycle<JsonStore>>>,
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
}

impl AppState {
    /// Open an initialized project directory (contains `.tracker/`).
    pub fn open(project_dir: PathBuf) -> Result<Self> {
        let paths = TrackerPaths::new(project_dir);
        ensure_layout(&paths)?;
        let config = load_config(&paths.config_path)?;
        Ok(Self::new(paths, config))
    }

    pub fn new(paths: TrackerPaths, config: TrackerConfig) -> Self {
        let service = TestLifecycle::new(JsonStore::new(&paths.tests_dir), config);
        let (event_tx, _) = broadcast::channel(64);
        Self {
            paths,
            service: Arc::new(Mutex::new(service)),
            event_tx: Arc::new(event_tx),
        }
    }
}
