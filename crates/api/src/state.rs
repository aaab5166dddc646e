use std::sync::Arc;

use numguard_worker::manual::ManualActionSender;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: numguard_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Producer side of the engine's manual action queue.
    pub manual: ManualActionSender,
}
