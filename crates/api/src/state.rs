use std::sync::Arc;

use portaria_engine::bus::EngineBus;
use portaria_engine::service::NotificationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: portaria_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Engine facade for notification operations.
    pub service: NotificationService,
    /// Engine event bus (escalation, quota alerts).
    pub event_bus: Arc<EngineBus>,
}

impl AppState {
    pub fn new(pool: portaria_db::DbPool, config: ServerConfig) -> Self {
        let event_bus = Arc::new(EngineBus::default());
        let service = NotificationService::new(pool.clone(), Arc::clone(&event_bus));
        Self {
            pool,
            config: Arc::new(config),
            service,
            event_bus,
        }
    }
}
