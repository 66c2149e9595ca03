use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::identity::TokenKeys;
use crate::permission::PermissionResolver;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Token signing keys
    pub keys: TokenKeys,
}

impl AppState {
    /// Create new application state
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let keys = TokenKeys::from_config(&config.auth);
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            keys,
        }
    }

    /// Resolver reading from this state's database
    pub fn resolver(&self) -> PermissionResolver<&DatabaseConnection> {
        PermissionResolver::new(&self.db)
    }
}
