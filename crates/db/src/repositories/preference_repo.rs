//! Repository for `usuarios` audience queries and
//! `usuarios_canais_preferencias` rows.

use sqlx::PgPool;

use portaria_core::audience::AudienceFilter;
use portaria_core::types::DbId;

use crate::models::preference::{ChannelPreference, UpdatePreference};
use crate::models::user::Usuario;

/// Column list for `usuarios_canais_preferencias` queries.
const PREF_COLUMNS: &str = "\
    id, usuario_id, push_habilitado, email_habilitado, whatsapp_habilitado, \
    sms_habilitado, voz_habilitado, in_app_habilitado, whatsapp_numero, \
    whatsapp_verificado, sms_numero, voz_numero, push_tokens, \
    receber_comunicados, receber_avisos, receber_alertas, receber_emergencias, \
    receber_lembretes, receber_cobrancas, receber_assembleias, \
    receber_ocorrencias, receber_chamados, horario_inicio_preferido, \
    horario_fim_preferido, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, condominio_id, nome, email, role, bloco_id, is_active, created_at";

/// Provides audience resolution and preference access.
pub struct PreferenceRepo;

impl PreferenceRepo {
    /// Active residents of a tenant matched by an audience filter.
    pub async fn list_audience(
        pool: &PgPool,
        condominio_id: DbId,
        filter: &AudienceFilter,
    ) -> Result<Vec<Usuario>, sqlx::Error> {
        match filter {
            AudienceFilter::Todos => {
                let query = format!(
                    "SELECT {USER_COLUMNS} FROM usuarios \
                     WHERE condominio_id = $1 AND is_active \
                     ORDER BY id"
                );
                sqlx::query_as::<_, Usuario>(&query)
                    .bind(condominio_id)
                    .fetch_all(pool)
                    .await
            }
            AudienceFilter::Bloco(bloco_ids) => {
                let query = format!(
                    "SELECT {USER_COLUMNS} FROM usuarios \
                     WHERE condominio_id = $1 AND is_active AND bloco_id = ANY($2) \
                     ORDER BY id"
                );
                sqlx::query_as::<_, Usuario>(&query)
                    .bind(condominio_id)
                    .bind(bloco_ids)
                    .fetch_all(pool)
                    .await
            }
            AudienceFilter::Role(roles) => {
                let query = format!(
                    "SELECT {USER_COLUMNS} FROM usuarios \
                     WHERE condominio_id = $1 AND is_active AND role = ANY($2) \
                     ORDER BY id"
                );
                sqlx::query_as::<_, Usuario>(&query)
                    .bind(condominio_id)
                    .bind(roles)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Find one user by ID.
    pub async fn find_user(pool: &PgPool, usuario_id: DbId) -> Result<Option<Usuario>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM usuarios WHERE id = $1");
        sqlx::query_as::<_, Usuario>(&query)
            .bind(usuario_id)
            .fetch_optional(pool)
            .await
    }

    /// Get one user's preference row, creating a defaults row lazily.
    pub async fn get_or_default(
        pool: &PgPool,
        usuario_id: DbId,
    ) -> Result<ChannelPreference, sqlx::Error> {
        sqlx::query(
            "INSERT INTO usuarios_canais_preferencias (usuario_id) VALUES ($1) \
             ON CONFLICT ON CONSTRAINT uq_preferencias_usuario DO NOTHING",
        )
        .bind(usuario_id)
        .execute(pool)
        .await?;

        let query = format!(
            "SELECT {PREF_COLUMNS} FROM usuarios_canais_preferencias WHERE usuario_id = $1"
        );
        sqlx::query_as::<_, ChannelPreference>(&query)
            .bind(usuario_id)
            .fetch_one(pool)
            .await
    }

    /// Preference rows for a batch of users. Users without a stored row are
    /// absent from the result; callers treat them as holding defaults.
    pub async fn list_for_users(
        pool: &PgPool,
        usuario_ids: &[DbId],
    ) -> Result<Vec<ChannelPreference>, sqlx::Error> {
        let query = format!(
            "SELECT {PREF_COLUMNS} FROM usuarios_canais_preferencias \
             WHERE usuario_id = ANY($1)"
        );
        sqlx::query_as::<_, ChannelPreference>(&query)
            .bind(usuario_ids)
            .fetch_all(pool)
            .await
    }

    /// Apply a partial update to a user's preferences, returning the new row.
    pub async fn update(
        pool: &PgPool,
        usuario_id: DbId,
        input: &UpdatePreference,
    ) -> Result<ChannelPreference, sqlx::Error> {
        Self::get_or_default(pool, usuario_id).await?;

        // Changing the WhatsApp number resets verification.
        let query = format!(
            "UPDATE usuarios_canais_preferencias SET \
                 push_habilitado = COALESCE($2, push_habilitado), \
                 email_habilitado = COALESCE($3, email_habilitado), \
                 whatsapp_habilitado = COALESCE($4, whatsapp_habilitado), \
                 sms_habilitado = COALESCE($5, sms_habilitado), \
                 voz_habilitado = COALESCE($6, voz_habilitado), \
                 in_app_habilitado = COALESCE($7, in_app_habilitado), \
                 whatsapp_numero = COALESCE($8, whatsapp_numero), \
                 whatsapp_verificado = CASE \
                     WHEN $8 IS NOT NULL AND $8 IS DISTINCT FROM whatsapp_numero \
                     THEN FALSE ELSE whatsapp_verificado END, \
                 sms_numero = COALESCE($9, sms_numero), \
                 voz_numero = COALESCE($10, voz_numero), \
                 receber_comunicados = COALESCE($11, receber_comunicados), \
                 receber_avisos = COALESCE($12, receber_avisos), \
                 receber_alertas = COALESCE($13, receber_alertas), \
                 receber_emergencias = COALESCE($14, receber_emergencias), \
                 receber_lembretes = COALESCE($15, receber_lembretes), \
                 receber_cobrancas = COALESCE($16, receber_cobrancas), \
                 receber_assembleias = COALESCE($17, receber_assembleias), \
                 receber_ocorrencias = COALESCE($18, receber_ocorrencias), \
                 receber_chamados = COALESCE($19, receber_chamados), \
                 updated_at = NOW() \
             WHERE usuario_id = $1 \
             RETURNING {PREF_COLUMNS}"
        );
        sqlx::query_as::<_, ChannelPreference>(&query)
            .bind(usuario_id)
            .bind(input.push_habilitado)
            .bind(input.email_habilitado)
            .bind(input.whatsapp_habilitado)
            .bind(input.sms_habilitado)
            .bind(input.voz_habilitado)
            .bind(input.in_app_habilitado)
            .bind(input.whatsapp_numero.as_deref())
            .bind(input.sms_numero.as_deref())
            .bind(input.voz_numero.as_deref())
            .bind(input.receber_comunicados)
            .bind(input.receber_avisos)
            .bind(input.receber_alertas)
            .bind(input.receber_emergencias)
            .bind(input.receber_lembretes)
            .bind(input.receber_cobrancas)
            .bind(input.receber_assembleias)
            .bind(input.receber_ocorrencias)
            .bind(input.receber_chamados)
            .fetch_one(pool)
            .await
    }
}
