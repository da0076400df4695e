//! User channel preference models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use portaria_core::channel::Channel;
use portaria_core::status::NotificationType;
use portaria_core::types::{DbId, Timestamp};

/// A row from the `usuarios_canais_preferencias` table: per-channel opt-in,
/// contact addresses, and per-category subscription flags. Consulted by the
/// recipient resolver; never mutated by the dispatcher.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChannelPreference {
    pub id: DbId,
    pub usuario_id: DbId,
    pub push_habilitado: bool,
    pub email_habilitado: bool,
    pub whatsapp_habilitado: bool,
    pub sms_habilitado: bool,
    pub voz_habilitado: bool,
    pub in_app_habilitado: bool,
    pub whatsapp_numero: Option<String>,
    pub whatsapp_verificado: bool,
    pub sms_numero: Option<String>,
    pub voz_numero: Option<String>,
    pub push_tokens: Option<serde_json::Value>,
    pub receber_comunicados: bool,
    pub receber_avisos: bool,
    pub receber_alertas: bool,
    pub receber_emergencias: bool,
    pub receber_lembretes: bool,
    pub receber_cobrancas: bool,
    pub receber_assembleias: bool,
    pub receber_ocorrencias: bool,
    pub receber_chamados: bool,
    pub horario_inicio_preferido: Option<chrono::NaiveTime>,
    pub horario_fim_preferido: Option<chrono::NaiveTime>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChannelPreference {
    /// Whether the user opted in to a channel.
    ///
    /// Channels that require a contact address count as opted-out while the
    /// address is missing; WhatsApp additionally requires verification.
    pub fn channel_opted_in(&self, canal: Channel) -> bool {
        match canal {
            Channel::Push => self.push_habilitado,
            Channel::Email => self.email_habilitado,
            Channel::Whatsapp => {
                self.whatsapp_habilitado
                    && self.whatsapp_verificado
                    && self.whatsapp_numero.is_some()
            }
            Channel::Sms => self.sms_habilitado && self.sms_numero.is_some(),
            Channel::Voz => self.voz_habilitado && self.voz_numero.is_some(),
            Channel::InApp => self.in_app_habilitado,
            // Mural is a physical posting, not a per-user channel.
            Channel::Mural => false,
        }
    }

    /// Whether the user subscribes to a notification category.
    pub fn subscribes_to(&self, tipo: NotificationType) -> bool {
        match tipo {
            NotificationType::Comunicado => self.receber_comunicados,
            NotificationType::Aviso => self.receber_avisos,
            NotificationType::Alerta => self.receber_alertas,
            NotificationType::Emergencia => self.receber_emergencias,
            NotificationType::Lembrete => self.receber_lembretes,
            NotificationType::Cobranca => self.receber_cobrancas,
            NotificationType::Assembleia => self.receber_assembleias,
            NotificationType::Ocorrencia => self.receber_ocorrencias,
            NotificationType::Chamado => self.receber_chamados,
            // System notices are not opt-out.
            NotificationType::Sistema => true,
        }
    }
}

/// Update DTO for `usuarios_canais_preferencias`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePreference {
    pub push_habilitado: Option<bool>,
    pub email_habilitado: Option<bool>,
    pub whatsapp_habilitado: Option<bool>,
    pub sms_habilitado: Option<bool>,
    pub voz_habilitado: Option<bool>,
    pub in_app_habilitado: Option<bool>,
    pub whatsapp_numero: Option<String>,
    pub sms_numero: Option<String>,
    pub voz_numero: Option<String>,
    pub receber_comunicados: Option<bool>,
    pub receber_avisos: Option<bool>,
    pub receber_alertas: Option<bool>,
    pub receber_emergencias: Option<bool>,
    pub receber_lembretes: Option<bool>,
    pub receber_cobrancas: Option<bool>,
    pub receber_assembleias: Option<bool>,
    pub receber_ocorrencias: Option<bool>,
    pub receber_chamados: Option<bool>,
}
