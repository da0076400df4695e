//! Repository for the `notificacoes` table.

use sqlx::PgPool;

use portaria_core::channel::Channel;
use portaria_core::status::DeliveryStatus;
use portaria_core::types::DbId;

use crate::models::notification::{
    InboxItem, NewNotification, Notification, NotificationStats,
};

/// Column list for `notificacoes` queries.
const COLUMNS: &str = "\
    id, condominio_id, criado_por, tipo, titulo, corpo, prioridade, \
    destinatarios_tipo, destinatarios_filtro, agendada_para, gerar_mural, \
    status, enviada_em, cancelada_em, total_destinatarios, \
    stats_enviados, stats_entregues, stats_lidos, stats_falhas, \
    created_at, updated_at";

/// Provides CRUD operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a new notification. The row starts `pendente` (or `agendado`
    /// when a future send time is set).
    pub async fn create(pool: &PgPool, input: &NewNotification) -> Result<Notification, sqlx::Error> {
        let status = if input.agendada_para.is_some() {
            DeliveryStatus::Agendado
        } else {
            DeliveryStatus::Pendente
        };
        let query = format!(
            "INSERT INTO notificacoes \
                 (condominio_id, criado_por, tipo, titulo, corpo, prioridade, \
                  destinatarios_tipo, destinatarios_filtro, agendada_para, gerar_mural, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(input.condominio_id)
            .bind(input.criado_por)
            .bind(input.tipo.as_str())
            .bind(&input.titulo)
            .bind(&input.corpo)
            .bind(input.prioridade.as_str())
            .bind(input.audiencia.kind())
            .bind(input.audiencia.payload())
            .bind(input.agendada_para)
            .bind(input.gerar_mural)
            .bind(status.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find a notification by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notificacoes WHERE id = $1");
        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record that deliveries were fanned out: set the recipient total and
    /// move the row to `enviando`. The row settles to `enviado` when the
    /// last delivery leaves an attemptable state (see
    /// [`DeliveryRepo`](crate::repositories::DeliveryRepo)).
    pub async fn mark_dispatched(
        pool: &PgPool,
        id: DbId,
        total_destinatarios: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes \
             SET total_destinatarios = $2, status = $3, enviada_em = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(total_destinatarios)
        .bind(DeliveryStatus::Enviando.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the recipient total for a scheduled notification without
    /// touching its status; the promoter flips it when the window arrives.
    pub async fn set_total_destinatarios(
        pool: &PgPool,
        id: DbId,
        total_destinatarios: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes SET total_destinatarios = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(total_destinatarios)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Move a scheduled notification into `enviando` once its first
    /// delivery is promoted. Idempotent across promoter passes.
    pub async fn mark_sending(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes \
             SET status = $2, enviada_em = COALESCE(enviada_em, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(DeliveryStatus::Enviando.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a zero-recipient notification as fully handled.
    pub async fn mark_completed_empty(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes \
             SET total_destinatarios = 0, status = $2, enviada_em = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(DeliveryStatus::Entregue.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel a notification unless it is already cancelled.
    ///
    /// Returns `true` when this call performed the cancellation. Pending
    /// deliveries and queue entries are cancelled separately by
    /// [`DeliveryRepo::cancel_pending`](crate::repositories::DeliveryRepo::cancel_pending).
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notificacoes \
             SET status = $2, cancelada_em = NOW(), updated_at = NOW() \
             WHERE id = $1 AND cancelada_em IS NULL",
        )
        .bind(id)
        .bind(DeliveryStatus::Cancelado.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the notification has been cancelled. Checked by workers
    /// after claiming and before sending, because cancellation races with
    /// in-flight claims.
    pub async fn is_cancelled(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let cancelled: Option<bool> = sqlx::query_scalar(
            "SELECT cancelada_em IS NOT NULL FROM notificacoes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        // A missing row behaves like a cancelled one: nothing to send.
        Ok(cancelled.unwrap_or(true))
    }

    /// Read the denormalized per-notification counters.
    pub async fn stats(pool: &PgPool, id: DbId) -> Result<Option<NotificationStats>, sqlx::Error> {
        sqlx::query_as::<_, NotificationStats>(
            "SELECT total_destinatarios, stats_enviados, stats_entregues, \
                    stats_lidos, stats_falhas \
             FROM notificacoes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List a user's inbox (`in_app` deliveries joined with notifications).
    pub async fn list_inbox(
        pool: &PgPool,
        usuario_id: DbId,
        apenas_nao_lidas: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InboxItem>, sqlx::Error> {
        let filter = if apenas_nao_lidas {
            "AND e.lida_em IS NULL"
        } else {
            ""
        };
        let query = format!(
            "SELECT n.id AS notificacao_id, n.tipo, n.titulo, n.corpo, n.prioridade, \
                    e.lida_em, n.created_at \
             FROM notificacoes_entregas e \
             JOIN notificacoes n ON n.id = e.notificacao_id \
             WHERE e.usuario_id = $1 AND e.canal = $4 AND e.status <> $5 \
                   {filter} \
             ORDER BY n.created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, InboxItem>(&query)
            .bind(usuario_id)
            .bind(limit)
            .bind(offset)
            .bind(Channel::InApp.as_str())
            .bind(DeliveryStatus::Cancelado.as_str())
            .fetch_all(pool)
            .await
    }

    /// Number of unread inbox items for a user.
    pub async fn unread_count(pool: &PgPool, usuario_id: DbId) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notificacoes_entregas \
             WHERE usuario_id = $1 AND canal = $2 \
               AND lida_em IS NULL AND status <> $3",
        )
        .bind(usuario_id)
        .bind(Channel::InApp.as_str())
        .bind(DeliveryStatus::Cancelado.as_str())
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }
}
