//! Tenant channel policy model.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use portaria_core::cascade::{CascadePolicy, DEFAULT_CASCADE_ORDER};
use portaria_core::channel::Channel;
use portaria_core::gates::QuietHoursGate;
use portaria_core::quiet_hours::QuietWindow;
use portaria_core::types::{DbId, Timestamp};

/// A row from the `notificacoes_config` table: one tenant's channel
/// toggles, quiet hours, cascade timers, and monthly quota/credit balances.
/// Read-only to the dispatcher; mutated only by tenant administrators.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TenantConfig {
    pub id: DbId,
    pub condominio_id: DbId,
    pub push_habilitado: bool,
    pub email_habilitado: bool,
    pub whatsapp_habilitado: bool,
    pub sms_habilitado: bool,
    pub voz_habilitado: bool,
    pub in_app_habilitado: bool,
    pub mural_habilitado: bool,
    pub email_remetente: Option<String>,
    pub email_nome_remetente: Option<String>,
    pub respeitar_horario: bool,
    pub horario_inicio: chrono::NaiveTime,
    pub horario_fim: chrono::NaiveTime,
    pub emergencia_ignora_horario: bool,
    pub cascata_habilitada: bool,
    pub cascata_ordem: Option<serde_json::Value>,
    pub tempo_push_para_email: i32,
    pub tempo_email_para_whatsapp: i32,
    pub tempo_whatsapp_para_sms: i32,
    pub limite_push_mensal: i32,
    pub limite_email_mensal: i32,
    pub creditos_whatsapp: i32,
    pub creditos_sms: i32,
    pub creditos_voz_minutos: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TenantConfig {
    /// Whether the tenant has a channel switched on.
    pub fn channel_enabled(&self, canal: Channel) -> bool {
        match canal {
            Channel::Push => self.push_habilitado,
            Channel::Email => self.email_habilitado,
            Channel::Whatsapp => self.whatsapp_habilitado,
            Channel::Sms => self.sms_habilitado,
            Channel::Voz => self.voz_habilitado,
            Channel::InApp => self.in_app_habilitado,
            Channel::Mural => self.mural_habilitado,
        }
    }

    /// Monthly allowance for a channel; `0` means unlimited for push/email
    /// and "no credits" for metered channels, which is what the quota gate
    /// expects (metered channels are prepaid).
    pub fn monthly_limit(&self, canal: Channel) -> i64 {
        match canal {
            Channel::Push => i64::from(self.limite_push_mensal),
            Channel::Email => i64::from(self.limite_email_mensal),
            Channel::Whatsapp => i64::from(self.creditos_whatsapp),
            Channel::Sms => i64::from(self.creditos_sms),
            Channel::Voz => i64::from(self.creditos_voz_minutos),
            Channel::InApp | Channel::Mural => 0,
        }
    }

    /// The quiet-hours gate view of this config.
    pub fn quiet_gate(&self) -> QuietHoursGate {
        QuietHoursGate {
            respected: self.respeitar_horario,
            window: QuietWindow::new(self.horario_inicio, self.horario_fim),
            emergency_bypass: self.emergencia_ignora_horario,
        }
    }

    /// The cascade policy view of this config.
    ///
    /// A malformed `cascata_ordem` value falls back to the default order
    /// rather than disabling escalation.
    pub fn cascade_policy(&self) -> CascadePolicy {
        let order = self
            .cascata_ordem
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<Channel>>(v.clone()).ok())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| DEFAULT_CASCADE_ORDER.to_vec());

        CascadePolicy {
            enabled: self.cascata_habilitada,
            order,
            push_to_email: Duration::from_secs(self.tempo_push_para_email.max(1) as u64 * 60),
            email_to_whatsapp: Duration::from_secs(
                self.tempo_email_para_whatsapp.max(1) as u64 * 60,
            ),
            whatsapp_to_sms: Duration::from_secs(self.tempo_whatsapp_para_sms.max(1) as u64 * 60),
        }
    }
}

/// Update DTO for `notificacoes_config` (admin surface).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTenantConfig {
    pub push_habilitado: Option<bool>,
    pub email_habilitado: Option<bool>,
    pub whatsapp_habilitado: Option<bool>,
    pub sms_habilitado: Option<bool>,
    pub voz_habilitado: Option<bool>,
    pub in_app_habilitado: Option<bool>,
    pub mural_habilitado: Option<bool>,
    pub email_remetente: Option<String>,
    pub email_nome_remetente: Option<String>,
    pub respeitar_horario: Option<bool>,
    pub horario_inicio: Option<chrono::NaiveTime>,
    pub horario_fim: Option<chrono::NaiveTime>,
    pub emergencia_ignora_horario: Option<bool>,
    pub cascata_habilitada: Option<bool>,
    pub cascata_ordem: Option<serde_json::Value>,
    pub tempo_push_para_email: Option<i32>,
    pub tempo_email_para_whatsapp: Option<i32>,
    pub tempo_whatsapp_para_sms: Option<i32>,
    pub limite_push_mensal: Option<i32>,
    pub limite_email_mensal: Option<i32>,
    pub creditos_whatsapp: Option<i32>,
    pub creditos_sms: Option<i32>,
    pub creditos_voz_minutos: Option<i32>,
}
