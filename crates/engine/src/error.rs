//! Engine error type.

use portaria_core::error::CoreError;

/// Errors surfaced by the engine to its callers (API handlers, workers).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Shortcut for a domain validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Validation(message.into()))
    }

    /// Shortcut for an entity lookup miss.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        EngineError::Core(CoreError::NotFound { entity, id })
    }
}
