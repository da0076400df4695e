//! Recipient resolution: audience filter → concrete users and their
//! level-0 channels.
//!
//! Resolution happens once, at fan-out. Escalation re-checks preferences
//! later because they can change while a chain is waiting.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;

use portaria_core::channel::Channel;
use portaria_core::quota;
use portaria_core::status::NotificationType;
use portaria_core::types::DbId;
use portaria_db::models::preference::ChannelPreference;
use portaria_db::models::quota::month_reference;
use portaria_db::models::tenant_config::TenantConfig;
use portaria_db::models::user::Usuario;
use portaria_db::repositories::{PreferenceRepo, QuotaRepo};

use crate::error::EngineError;

/// One resolved recipient: the user plus the channels that get a level-0
/// delivery row.
#[derive(Debug)]
pub struct ResolvedRecipient {
    pub usuario: Usuario,
    pub canais: Vec<Channel>,
}

/// Plan a user's level-0 channels for one notification.
///
/// Every recipient gets an `in_app` row when the channel is on (the inbox
/// is the system of record for reads), plus the first cascade-order channel
/// that both the tenant and the user have enabled. Metered channels listed
/// in `sem_credito` are skipped the same way disabled ones are, so a chain
/// starting on an exhausted channel falls through instead of producing
/// deliveries doomed to fail. A `None` preference row means the user never
/// customized anything and holds the defaults: push, email, and in-app on,
/// everything subscribed.
pub fn plan_channels(
    tenant: &TenantConfig,
    prefs: Option<&ChannelPreference>,
    tipo: NotificationType,
    cascade_order: &[Channel],
    sem_credito: &[Channel],
) -> Vec<Channel> {
    let subscribed = prefs.map(|p| p.subscribes_to(tipo)).unwrap_or(true);
    if !subscribed && !tipo.is_emergency() {
        return Vec::new();
    }

    let mut canais = Vec::with_capacity(2);

    let in_app_opted = prefs.map(|p| p.channel_opted_in(Channel::InApp)).unwrap_or(true);
    if tenant.channel_enabled(Channel::InApp) && in_app_opted {
        canais.push(Channel::InApp);
    }

    let external = cascade_order.iter().copied().find(|canal| {
        let opted = prefs
            .map(|p| p.channel_opted_in(*canal))
            .unwrap_or(matches!(*canal, Channel::Push | Channel::Email));
        tenant.channel_enabled(*canal) && opted && !sem_credito.contains(canal)
    });
    if let Some(canal) = external {
        canais.push(canal);
    }

    canais
}

/// Resolve a notification's audience into recipients and channel plans.
///
/// An empty result is a valid outcome (an audience filter can legitimately
/// match nobody); the caller closes the notification as complete.
pub async fn resolve(
    pool: &PgPool,
    condominio_id: DbId,
    audiencia: &portaria_core::audience::AudienceFilter,
    tipo: NotificationType,
    tenant: &TenantConfig,
) -> Result<Vec<ResolvedRecipient>, EngineError> {
    let users = PreferenceRepo::list_audience(pool, condominio_id, audiencia).await?;
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<DbId> = users.iter().map(|u| u.id).collect();
    let prefs: HashMap<DbId, ChannelPreference> =
        PreferenceRepo::list_for_users(pool, &ids)
            .await?
            .into_iter()
            .map(|p| (p.usuario_id, p))
            .collect();

    let order = tenant.cascade_policy().order;

    // Metered channels with no remaining credit are ineligible for the
    // whole fan-out; mid-flight exhaustion is still caught by the
    // dispatcher's quota gate.
    let usage = QuotaRepo::current(pool, condominio_id, month_reference(Utc::now())).await?;
    let sem_credito: Vec<Channel> = order
        .iter()
        .copied()
        .filter(|canal| {
            canal.is_metered()
                && !quota::has_credit(usage.usage_for(*canal), tenant.monthly_limit(*canal))
        })
        .collect();

    let recipients = users
        .into_iter()
        .filter_map(|usuario| {
            let canais =
                plan_channels(tenant, prefs.get(&usuario.id), tipo, &order, &sem_credito);
            if canais.is_empty() {
                None
            } else {
                Some(ResolvedRecipient { usuario, canais })
            }
        })
        .collect();

    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant() -> TenantConfig {
        TenantConfig {
            id: 1,
            condominio_id: 1,
            push_habilitado: true,
            email_habilitado: true,
            whatsapp_habilitado: false,
            sms_habilitado: false,
            voz_habilitado: false,
            in_app_habilitado: true,
            mural_habilitado: true,
            email_remetente: None,
            email_nome_remetente: None,
            respeitar_horario: true,
            horario_inicio: chrono::NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            horario_fim: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            emergencia_ignora_horario: true,
            cascata_habilitada: true,
            cascata_ordem: None,
            tempo_push_para_email: 5,
            tempo_email_para_whatsapp: 10,
            tempo_whatsapp_para_sms: 10,
            limite_push_mensal: 0,
            limite_email_mensal: 0,
            creditos_whatsapp: 0,
            creditos_sms: 0,
            creditos_voz_minutos: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn prefs() -> ChannelPreference {
        ChannelPreference {
            id: 1,
            usuario_id: 1,
            push_habilitado: true,
            email_habilitado: true,
            whatsapp_habilitado: false,
            sms_habilitado: false,
            voz_habilitado: false,
            in_app_habilitado: true,
            whatsapp_numero: None,
            whatsapp_verificado: false,
            sms_numero: None,
            voz_numero: None,
            push_tokens: None,
            receber_comunicados: true,
            receber_avisos: true,
            receber_alertas: true,
            receber_emergencias: true,
            receber_lembretes: true,
            receber_cobrancas: true,
            receber_assembleias: true,
            receber_ocorrencias: true,
            receber_chamados: true,
            horario_inicio_preferido: None,
            horario_fim_preferido: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const ORDER: [Channel; 4] =
        [Channel::Push, Channel::Email, Channel::Whatsapp, Channel::Sms];

    #[test]
    fn default_plan_is_in_app_plus_push() {
        let plan = plan_channels(&tenant(), None, NotificationType::Aviso, &ORDER, &[]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Push]);
    }

    #[test]
    fn opted_out_category_gets_nothing() {
        let mut p = prefs();
        p.receber_cobrancas = false;
        let plan = plan_channels(&tenant(), Some(&p), NotificationType::Cobranca, &ORDER, &[]);
        assert!(plan.is_empty());
    }

    #[test]
    fn emergencies_ignore_category_opt_out() {
        let mut p = prefs();
        p.receber_emergencias = false;
        let plan = plan_channels(&tenant(), Some(&p), NotificationType::Emergencia, &ORDER, &[]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Push]);
    }

    #[test]
    fn push_opt_out_falls_through_to_email() {
        let mut p = prefs();
        p.push_habilitado = false;
        let plan = plan_channels(&tenant(), Some(&p), NotificationType::Aviso, &ORDER, &[]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Email]);
    }

    #[test]
    fn tenant_disabled_channel_skipped_even_when_opted_in() {
        let mut t = tenant();
        t.push_habilitado = false;
        let plan = plan_channels(&t, Some(&prefs()), NotificationType::Aviso, &ORDER, &[]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Email]);
    }

    #[test]
    fn fully_opted_out_recipient_keeps_only_in_app() {
        let mut p = prefs();
        p.push_habilitado = false;
        p.email_habilitado = false;
        let plan = plan_channels(&tenant(), Some(&p), NotificationType::Aviso, &ORDER, &[]);
        assert_eq!(plan, vec![Channel::InApp]);
    }

    #[test]
    fn exhausted_metered_channel_falls_through() {
        let mut t = tenant();
        t.whatsapp_habilitado = true;
        let mut p = prefs();
        p.whatsapp_habilitado = true;
        p.whatsapp_verificado = true;
        p.whatsapp_numero = Some("+5511988887777".to_string());
        let order = [Channel::Whatsapp, Channel::Push, Channel::Email];

        // With credit the chain starts on WhatsApp.
        let plan = plan_channels(&t, Some(&p), NotificationType::Aviso, &order, &[]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Whatsapp]);

        // Without credit it falls through to the next eligible channel.
        let plan =
            plan_channels(&t, Some(&p), NotificationType::Aviso, &order, &[Channel::Whatsapp]);
        assert_eq!(plan, vec![Channel::InApp, Channel::Push]);
    }
}
