//! Delivery status, notification type, and priority enumerations.
//!
//! String values match the `status_entrega`, `tipo_notificacao`, and
//! `prioridade_comunicado` database enums. No magic strings elsewhere —
//! every status literal goes through these types.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a single delivery attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Ready to be attempted.
    Pendente,
    /// Scheduled for a future send window.
    Agendado,
    /// Claimed by a worker, provider call in flight.
    Enviando,
    /// Provider accepted the message.
    Enviado,
    /// Provider confirmed delivery to the recipient device/inbox.
    Entregue,
    /// Recipient acknowledged (terminal).
    Lido,
    /// Failed permanently or exhausted retries (terminal).
    Falhou,
    /// Cancelled before completion (terminal).
    Cancelado,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pendente => "pendente",
            DeliveryStatus::Agendado => "agendado",
            DeliveryStatus::Enviando => "enviando",
            DeliveryStatus::Enviado => "enviado",
            DeliveryStatus::Entregue => "entregue",
            DeliveryStatus::Lido => "lido",
            DeliveryStatus::Falhou => "falhou",
            DeliveryStatus::Cancelado => "cancelado",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pendente" => Ok(DeliveryStatus::Pendente),
            "agendado" => Ok(DeliveryStatus::Agendado),
            "enviando" => Ok(DeliveryStatus::Enviando),
            "enviado" => Ok(DeliveryStatus::Enviado),
            "entregue" => Ok(DeliveryStatus::Entregue),
            "lido" => Ok(DeliveryStatus::Lido),
            "falhou" => Ok(DeliveryStatus::Falhou),
            "cancelado" => Ok(DeliveryStatus::Cancelado),
            other => Err(CoreError::Validation(format!(
                "Unknown delivery status: {other}"
            ))),
        }
    }

    /// A terminal delivery never transitions again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Lido | DeliveryStatus::Falhou | DeliveryStatus::Cancelado
        )
    }

    /// Whether the provider has already accepted this delivery.
    ///
    /// Once true, a cancellation can no longer stop the send itself; it only
    /// suppresses further escalation.
    pub fn is_sent(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Enviado | DeliveryStatus::Entregue | DeliveryStatus::Lido
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

/// The business category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Comunicado,
    Aviso,
    Alerta,
    Emergencia,
    Lembrete,
    Cobranca,
    Assembleia,
    Ocorrencia,
    Chamado,
    Sistema,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Comunicado => "comunicado",
            NotificationType::Aviso => "aviso",
            NotificationType::Alerta => "alerta",
            NotificationType::Emergencia => "emergencia",
            NotificationType::Lembrete => "lembrete",
            NotificationType::Cobranca => "cobranca",
            NotificationType::Assembleia => "assembleia",
            NotificationType::Ocorrencia => "ocorrencia",
            NotificationType::Chamado => "chamado",
            NotificationType::Sistema => "sistema",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "comunicado" => Ok(NotificationType::Comunicado),
            "aviso" => Ok(NotificationType::Aviso),
            "alerta" => Ok(NotificationType::Alerta),
            "emergencia" => Ok(NotificationType::Emergencia),
            "lembrete" => Ok(NotificationType::Lembrete),
            "cobranca" => Ok(NotificationType::Cobranca),
            "assembleia" => Ok(NotificationType::Assembleia),
            "ocorrencia" => Ok(NotificationType::Ocorrencia),
            "chamado" => Ok(NotificationType::Chamado),
            "sistema" => Ok(NotificationType::Sistema),
            other => Err(CoreError::Validation(format!(
                "Unknown notification type: {other}"
            ))),
        }
    }

    /// Emergency notifications bypass the cascade toggle and, when the
    /// tenant allows it, quiet hours.
    pub fn is_emergency(&self) -> bool {
        matches!(self, NotificationType::Emergencia)
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Notification priority, ordered `baixa < normal < alta < critica`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Baixa,
    Normal,
    Alta,
    Critica,
}

/// Minimum priority at which cascade escalation engages for non-emergency
/// notifications.
pub const CASCADE_MIN_PRIORITY: Priority = Priority::Alta;

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Baixa => "baixa",
            Priority::Normal => "normal",
            Priority::Alta => "alta",
            Priority::Critica => "critica",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "baixa" => Ok(Priority::Baixa),
            "normal" => Ok(Priority::Normal),
            "alta" => Ok(Priority::Alta),
            "critica" => Ok(Priority::Critica),
            other => Err(CoreError::Validation(format!("Unknown priority: {other}"))),
        }
    }

    /// Numeric queue priority; higher is claimed first.
    ///
    /// Base priorities are spaced apart so that cascade escalations can be
    /// enqueued one step above their notification's base without overtaking
    /// a strictly higher base priority.
    pub fn queue_priority(&self) -> i32 {
        match self {
            Priority::Baixa => 10,
            Priority::Normal => 20,
            Priority::Alta => 30,
            Priority::Critica => 40,
        }
    }

    /// Queue priority for a cascade escalation of this notification.
    pub fn escalated_queue_priority(&self) -> i32 {
        self.queue_priority() + 5
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
