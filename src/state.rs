use std::sync::Arc;

use crate::config::AppConfig;
use crate::mailer::Mailer;
use crate::session::SessionManager;
use crate::storage::ObjectStorage;
use crate::store::Store;

/// Shared application state available to all handlers via `State<AppState>`.
/// Cloning is cheap; everything heavy sits behind an `Arc` or a pool.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub storage: Arc<ObjectStorage>,
    pub mailer: Mailer,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        let storage = ObjectStorage::from_config(&config.storage);
        let mailer = Mailer::from_config(&config.mail);
        let sessions = SessionManager::new(&config.jwt_secret, config.session_ttl_minutes);
        Self {
            config: Arc::new(config),
            store,
            storage: Arc::new(storage),
            mailer,
            sessions: Arc::new(sessions),
        }
    }
}
