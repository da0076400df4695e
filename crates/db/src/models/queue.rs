//! Work-queue models.

use serde::Serialize;
use sqlx::FromRow;

use portaria_core::types::{DbId, Timestamp};

/// A row from the `notificacoes_fila` table: a pointer to a pending
/// delivery plus its claim lease.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueEntry {
    pub id: DbId,
    pub entrega_id: DbId,
    pub prioridade: i32,
    pub processar_apos: Timestamp,
    pub processando: bool,
    pub processando_por: Option<String>,
    pub processando_desde: Option<Timestamp>,
    pub lease_expira_em: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// The result of a successful claim: which delivery to process and the
/// queue row holding the lease.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedEntry {
    pub id: DbId,
    pub entrega_id: DbId,
    pub lease_expira_em: Timestamp,
}
