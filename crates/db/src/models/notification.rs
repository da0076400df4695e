//! Notification entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use portaria_core::audience::AudienceFilter;
use portaria_core::error::CoreError;
use portaria_core::status::{DeliveryStatus, NotificationType, Priority};
use portaria_core::types::{DbId, Timestamp};

/// A row from the `notificacoes` table.
///
/// The `stats_*` columns are a denormalized cache over the delivery rows;
/// they are only ever mutated by atomic increments inside the same
/// transaction as the triggering delivery update.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub condominio_id: DbId,
    pub criado_por: Option<DbId>,
    pub tipo: String,
    pub titulo: String,
    pub corpo: String,
    pub prioridade: String,
    pub destinatarios_tipo: String,
    pub destinatarios_filtro: Option<serde_json::Value>,
    pub agendada_para: Option<Timestamp>,
    pub gerar_mural: bool,
    pub status: String,
    pub enviada_em: Option<Timestamp>,
    pub cancelada_em: Option<Timestamp>,
    pub total_destinatarios: i32,
    pub stats_enviados: i32,
    pub stats_entregues: i32,
    pub stats_lidos: i32,
    pub stats_falhas: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Notification {
    pub fn tipo(&self) -> Result<NotificationType, CoreError> {
        NotificationType::parse(&self.tipo)
    }

    pub fn prioridade(&self) -> Result<Priority, CoreError> {
        Priority::parse(&self.prioridade)
    }

    pub fn status(&self) -> Result<DeliveryStatus, CoreError> {
        DeliveryStatus::parse(&self.status)
    }

    pub fn audience(&self) -> Result<AudienceFilter, CoreError> {
        let payload = self
            .destinatarios_filtro
            .clone()
            .unwrap_or(serde_json::Value::Null);
        AudienceFilter::from_row(&self.destinatarios_tipo, &payload)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelada_em.is_some()
    }
}

/// Insert DTO for `notificacoes`.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub condominio_id: DbId,
    pub criado_por: Option<DbId>,
    pub tipo: NotificationType,
    pub titulo: String,
    pub corpo: String,
    pub prioridade: Priority,
    pub audiencia: AudienceFilter,
    pub agendada_para: Option<Timestamp>,
    pub gerar_mural: bool,
}

/// Denormalized per-notification counters for dashboard reads.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationStats {
    pub total_destinatarios: i32,
    pub stats_enviados: i32,
    pub stats_entregues: i32,
    pub stats_lidos: i32,
    pub stats_falhas: i32,
}

/// Which denormalized counter a delivery transition bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Enviados,
    Entregues,
    Lidos,
    Falhas,
}

impl StatField {
    /// Column name; the set is closed so this never reaches SQL unchecked.
    pub fn column(&self) -> &'static str {
        match self {
            StatField::Enviados => "stats_enviados",
            StatField::Entregues => "stats_entregues",
            StatField::Lidos => "stats_lidos",
            StatField::Falhas => "stats_falhas",
        }
    }
}

/// One row of a user's notification inbox (`in_app` deliveries joined with
/// their notification).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InboxItem {
    pub notificacao_id: DbId,
    pub tipo: String,
    pub titulo: String,
    pub corpo: String,
    pub prioridade: String,
    pub lida_em: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Query parameters for inbox listing.
#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub apenas_nao_lidas: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
