//! Repository for the `notificacoes_config` table.

use sqlx::PgPool;

use portaria_core::types::DbId;

use crate::models::tenant_config::{TenantConfig, UpdateTenantConfig};

/// Column list for `notificacoes_config` queries.
const COLUMNS: &str = "\
    id, condominio_id, push_habilitado, email_habilitado, whatsapp_habilitado, \
    sms_habilitado, voz_habilitado, in_app_habilitado, mural_habilitado, \
    email_remetente, email_nome_remetente, respeitar_horario, horario_inicio, \
    horario_fim, emergencia_ignora_horario, cascata_habilitada, cascata_ordem, \
    tempo_push_para_email, tempo_email_para_whatsapp, tempo_whatsapp_para_sms, \
    limite_push_mensal, limite_email_mensal, creditos_whatsapp, creditos_sms, \
    creditos_voz_minutos, created_at, updated_at";

/// Provides access to per-tenant channel policy.
pub struct TenantConfigRepo;

impl TenantConfigRepo {
    /// Get the tenant's config row, creating a defaults row lazily so
    /// every tenant always has an effective policy.
    pub async fn get_or_default(
        pool: &PgPool,
        condominio_id: DbId,
    ) -> Result<TenantConfig, sqlx::Error> {
        sqlx::query(
            "INSERT INTO notificacoes_config (condominio_id) VALUES ($1) \
             ON CONFLICT ON CONSTRAINT uq_notificacoes_config_condominio DO NOTHING",
        )
        .bind(condominio_id)
        .execute(pool)
        .await?;

        let query = format!("SELECT {COLUMNS} FROM notificacoes_config WHERE condominio_id = $1");
        sqlx::query_as::<_, TenantConfig>(&query)
            .bind(condominio_id)
            .fetch_one(pool)
            .await
    }

    /// Apply a partial update to the tenant's config, returning the new row.
    pub async fn update(
        pool: &PgPool,
        condominio_id: DbId,
        input: &UpdateTenantConfig,
    ) -> Result<TenantConfig, sqlx::Error> {
        // Make sure the row exists before the COALESCE update.
        Self::get_or_default(pool, condominio_id).await?;

        let query = format!(
            "UPDATE notificacoes_config SET \
                 push_habilitado = COALESCE($2, push_habilitado), \
                 email_habilitado = COALESCE($3, email_habilitado), \
                 whatsapp_habilitado = COALESCE($4, whatsapp_habilitado), \
                 sms_habilitado = COALESCE($5, sms_habilitado), \
                 voz_habilitado = COALESCE($6, voz_habilitado), \
                 in_app_habilitado = COALESCE($7, in_app_habilitado), \
                 mural_habilitado = COALESCE($8, mural_habilitado), \
                 email_remetente = COALESCE($9, email_remetente), \
                 email_nome_remetente = COALESCE($10, email_nome_remetente), \
                 respeitar_horario = COALESCE($11, respeitar_horario), \
                 horario_inicio = COALESCE($12, horario_inicio), \
                 horario_fim = COALESCE($13, horario_fim), \
                 emergencia_ignora_horario = COALESCE($14, emergencia_ignora_horario), \
                 cascata_habilitada = COALESCE($15, cascata_habilitada), \
                 cascata_ordem = COALESCE($16, cascata_ordem), \
                 tempo_push_para_email = COALESCE($17, tempo_push_para_email), \
                 tempo_email_para_whatsapp = COALESCE($18, tempo_email_para_whatsapp), \
                 tempo_whatsapp_para_sms = COALESCE($19, tempo_whatsapp_para_sms), \
                 limite_push_mensal = COALESCE($20, limite_push_mensal), \
                 limite_email_mensal = COALESCE($21, limite_email_mensal), \
                 creditos_whatsapp = COALESCE($22, creditos_whatsapp), \
                 creditos_sms = COALESCE($23, creditos_sms), \
                 creditos_voz_minutos = COALESCE($24, creditos_voz_minutos), \
                 updated_at = NOW() \
             WHERE condominio_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TenantConfig>(&query)
            .bind(condominio_id)
            .bind(input.push_habilitado)
            .bind(input.email_habilitado)
            .bind(input.whatsapp_habilitado)
            .bind(input.sms_habilitado)
            .bind(input.voz_habilitado)
            .bind(input.in_app_habilitado)
            .bind(input.mural_habilitado)
            .bind(input.email_remetente.as_deref())
            .bind(input.email_nome_remetente.as_deref())
            .bind(input.respeitar_horario)
            .bind(input.horario_inicio)
            .bind(input.horario_fim)
            .bind(input.emergencia_ignora_horario)
            .bind(input.cascata_habilitada)
            .bind(input.cascata_ordem.as_ref())
            .bind(input.tempo_push_para_email)
            .bind(input.tempo_email_para_whatsapp)
            .bind(input.tempo_whatsapp_para_sms)
            .bind(input.limite_push_mensal)
            .bind(input.limite_email_mensal)
            .bind(input.creditos_whatsapp)
            .bind(input.creditos_sms)
            .bind(input.creditos_voz_minutos)
            .fetch_one(pool)
            .await
    }
}
