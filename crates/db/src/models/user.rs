//! Resident models consumed by the recipient resolver.

use serde::Serialize;
use sqlx::FromRow;

use portaria_core::types::{DbId, Timestamp};

/// A row from the `usuarios` table (the subset the engine needs).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Usuario {
    pub id: DbId,
    pub condominio_id: DbId,
    pub nome: String,
    pub email: String,
    pub role: String,
    pub bloco_id: Option<DbId>,
    pub is_active: bool,
    pub created_at: Timestamp,
}
