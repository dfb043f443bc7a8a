//! Shared application state for the axum handlers.

use crate::engine::VideoAnalyzer;
use crate::session::Session;
use crate::types::Config;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub analyzer: Arc<dyn VideoAnalyzer>,
    /// Current or last finished session; `None` until the first upload.
    pub session: Arc<RwLock<Option<Session>>>,
}

impl AppState {
    pub fn new(config: Config, analyzer: Arc<dyn VideoAnalyzer>) -> Self {
        Self {
            config: Arc::new(config),
            analyzer,
            session: Arc::new(RwLock::new(None)),
        }
    }
}
