//! Delivery attempt models.

use serde::Serialize;
use sqlx::FromRow;

use portaria_core::channel::Channel;
use portaria_core::error::CoreError;
use portaria_core::status::{DeliveryStatus, NotificationType, Priority};
use portaria_core::types::{DbId, Timestamp};

/// A row from the `notificacoes_entregas` table: one attempt chain to
/// deliver one notification to one user via one channel at one cascade
/// level. Retries mutate `tentativas` on the same row; escalation inserts a
/// new row at `cascata_nivel + 1`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Delivery {
    pub id: DbId,
    pub notificacao_id: DbId,
    pub usuario_id: DbId,
    pub canal: String,
    pub status: String,
    pub cascata_nivel: i16,
    pub canal_origem: Option<String>,
    pub escalada: bool,
    pub tentativas: i16,
    pub max_tentativas: i16,
    pub proxima_tentativa: Option<Timestamp>,
    pub agendada_para: Option<Timestamp>,
    pub provider_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub erro_codigo: Option<String>,
    pub erro_mensagem: Option<String>,
    pub custo_centavos: Option<i32>,
    pub enviada_em: Option<Timestamp>,
    pub entregue_em: Option<Timestamp>,
    pub lida_em: Option<Timestamp>,
    pub falhou_em: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Delivery {
    pub fn canal(&self) -> Result<Channel, CoreError> {
        Channel::parse(&self.canal)
    }

    pub fn status(&self) -> Result<DeliveryStatus, CoreError> {
        DeliveryStatus::parse(&self.status)
    }

    /// Whether another retry may be scheduled after a transient failure.
    pub fn attempts_remaining(&self) -> bool {
        self.tentativas < self.max_tentativas
    }
}

/// Insert DTO for `notificacoes_entregas`.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub notificacao_id: DbId,
    pub usuario_id: DbId,
    pub canal: Channel,
    pub status: DeliveryStatus,
    pub cascata_nivel: i16,
    pub canal_origem: Option<Channel>,
    pub max_tentativas: i16,
    pub agendada_para: Option<Timestamp>,
}

/// A sent-but-unread delivery joined with the notification fields the
/// escalation scanner needs to apply the tenant's cascade policy.
#[derive(Debug, Clone, FromRow)]
pub struct EscalationCandidate {
    pub entrega_id: DbId,
    pub notificacao_id: DbId,
    pub usuario_id: DbId,
    pub condominio_id: DbId,
    pub canal: String,
    pub cascata_nivel: i16,
    pub enviada_em: Timestamp,
    pub tipo: String,
    pub prioridade: String,
}

impl EscalationCandidate {
    pub fn canal(&self) -> Result<Channel, CoreError> {
        Channel::parse(&self.canal)
    }

    pub fn tipo(&self) -> Result<NotificationType, CoreError> {
        NotificationType::parse(&self.tipo)
    }

    pub fn prioridade(&self) -> Result<Priority, CoreError> {
        Priority::parse(&self.prioridade)
    }
}
