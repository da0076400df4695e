//! Repository for the `notificacoes_entregas` table.
//!
//! Delivery rows are the single source of truth for the engine. Every
//! transition that changes a notification's denormalized counters performs
//! both updates in one transaction, so the dashboard cache can never drift
//! from the underlying rows.

use sqlx::{PgPool, Postgres, Transaction};

use portaria_core::channel::Channel;
use portaria_core::status::DeliveryStatus;
use portaria_core::types::{DbId, Timestamp};

use crate::models::delivery::{Delivery, EscalationCandidate, NewDelivery};
use crate::models::notification::StatField;

/// Column list for `notificacoes_entregas` queries.
const COLUMNS: &str = "\
    id, notificacao_id, usuario_id, canal, status, cascata_nivel, canal_origem, \
    escalada, tentativas, max_tentativas, proxima_tentativa, agendada_para, \
    provider_id, provider_response, erro_codigo, erro_mensagem, custo_centavos, \
    enviada_em, entregue_em, lida_em, falhou_em, created_at, updated_at";

/// Provides state transitions for delivery attempts.
pub struct DeliveryRepo;

impl DeliveryRepo {
    /// Insert a delivery row.
    ///
    /// Returns `None` when a row for the same
    /// (notification, user, channel, cascade level) already exists, which
    /// makes creation idempotent under concurrent escalation scanners.
    pub async fn create(pool: &PgPool, input: &NewDelivery) -> Result<Option<Delivery>, sqlx::Error> {
        let query = format!(
            "INSERT INTO notificacoes_entregas \
                 (notificacao_id, usuario_id, canal, status, cascata_nivel, \
                  canal_origem, max_tentativas, agendada_para) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT ON CONSTRAINT uq_entrega_nivel DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Delivery>(&query)
            .bind(input.notificacao_id)
            .bind(input.usuario_id)
            .bind(input.canal.as_str())
            .bind(input.status.as_str())
            .bind(input.cascata_nivel)
            .bind(input.canal_origem.map(|c| c.as_str()))
            .bind(input.max_tentativas)
            .bind(input.agendada_para)
            .fetch_optional(pool)
            .await
    }

    /// Find a delivery by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Delivery>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notificacoes_entregas WHERE id = $1");
        sqlx::query_as::<_, Delivery>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a claimed delivery into `enviando` and consume one attempt.
    ///
    /// Returns the updated row, or `None` when the delivery is no longer
    /// attemptable (already terminal or being processed elsewhere). This is
    /// the idempotency guard against double-processing after a lease
    /// expires mid-send.
    pub async fn begin_attempt(pool: &PgPool, id: DbId) -> Result<Option<Delivery>, sqlx::Error> {
        let query = format!(
            "UPDATE notificacoes_entregas \
             SET status = $2, tentativas = tentativas + 1, updated_at = NOW() \
             WHERE id = $1 AND status IN ($3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Delivery>(&query)
            .bind(id)
            .bind(DeliveryStatus::Enviando.as_str())
            .bind(DeliveryStatus::Pendente.as_str())
            .bind(DeliveryStatus::Agendado.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Record a provider acceptance: `enviando` → `enviado`, bumping the
    /// notification's `stats_enviados` in the same transaction.
    pub async fn record_sent(
        pool: &PgPool,
        id: DbId,
        provider_id: Option<&str>,
        provider_response: Option<&serde_json::Value>,
        custo_centavos: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let notificacao_id: Option<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $2, enviada_em = NOW(), provider_id = $3, \
                 provider_response = $4, custo_centavos = $5, \
                 erro_codigo = NULL, erro_mensagem = NULL, \
                 proxima_tentativa = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $6 \
             RETURNING notificacao_id",
        )
        .bind(id)
        .bind(DeliveryStatus::Enviado.as_str())
        .bind(provider_id)
        .bind(provider_response)
        .bind(custo_centavos)
        .bind(DeliveryStatus::Enviando.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(nid) = notificacao_id {
            Self::bump_stat(&mut tx, nid, StatField::Enviados).await?;
            Self::close_if_settled(&mut tx, nid).await?;
        }
        tx.commit().await
    }

    /// Record a provider delivery confirmation: `enviado` → `entregue`.
    pub async fn record_delivered(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let notificacao_id: Option<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $2, entregue_em = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $3 \
             RETURNING notificacao_id",
        )
        .bind(id)
        .bind(DeliveryStatus::Entregue.as_str())
        .bind(DeliveryStatus::Enviado.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let confirmed = notificacao_id.is_some();
        if let Some(nid) = notificacao_id {
            Self::bump_stat(&mut tx, nid, StatField::Entregues).await?;
        }
        tx.commit().await?;
        Ok(confirmed)
    }

    /// Record a transient failure with a scheduled retry:
    /// `enviando` → `pendente` with `proxima_tentativa` set.
    pub async fn record_retry(
        pool: &PgPool,
        id: DbId,
        erro_codigo: &str,
        erro_mensagem: &str,
        proxima_tentativa: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes_entregas \
             SET status = $2, erro_codigo = $3, erro_mensagem = $4, \
                 proxima_tentativa = $5, updated_at = NOW() \
             WHERE id = $1 AND status = $6",
        )
        .bind(id)
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(erro_codigo)
        .bind(erro_mensagem)
        .bind(proxima_tentativa)
        .bind(DeliveryStatus::Enviando.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a terminal failure, bumping `stats_falhas` transactionally.
    pub async fn record_failed(
        pool: &PgPool,
        id: DbId,
        erro_codigo: &str,
        erro_mensagem: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let notificacao_id: Option<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $2, falhou_em = NOW(), erro_codigo = $3, \
                 erro_mensagem = $4, proxima_tentativa = NULL, updated_at = NOW() \
             WHERE id = $1 AND status IN ($5, $6, $7) \
             RETURNING notificacao_id",
        )
        .bind(id)
        .bind(DeliveryStatus::Falhou.as_str())
        .bind(erro_codigo)
        .bind(erro_mensagem)
        .bind(DeliveryStatus::Enviando.as_str())
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(nid) = notificacao_id {
            Self::bump_stat(&mut tx, nid, StatField::Falhas).await?;
            Self::close_if_settled(&mut tx, nid).await?;
        }
        tx.commit().await
    }

    /// Cancel a single non-terminal delivery (no counter is bumped).
    pub async fn mark_cancelled(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let notificacao_id: Option<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ($3, $4, $5) \
             RETURNING notificacao_id",
        )
        .bind(id)
        .bind(DeliveryStatus::Cancelado.as_str())
        .bind(DeliveryStatus::Lido.as_str())
        .bind(DeliveryStatus::Falhou.as_str())
        .bind(DeliveryStatus::Cancelado.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let cancelled = notificacao_id.is_some();
        if let Some(nid) = notificacao_id {
            Self::close_if_settled(&mut tx, nid).await?;
        }
        tx.commit().await?;
        Ok(cancelled)
    }

    /// Bulk-cancel everything still pending for a cancelled notification:
    /// queue entries are deleted and unclaimed deliveries move to
    /// `cancelado` in one transaction.
    ///
    /// Deliveries currently `enviando` are left to their claiming worker,
    /// which re-checks cancellation at the pre-send gate.
    pub async fn cancel_pending(pool: &PgPool, notificacao_id: DbId) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM notificacoes_fila f \
             USING notificacoes_entregas e \
             WHERE f.entrega_id = e.id AND e.notificacao_id = $1",
        )
        .bind(notificacao_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE notificacoes_entregas \
             SET status = $2, updated_at = NOW() \
             WHERE notificacao_id = $1 AND status IN ($3, $4)",
        )
        .bind(notificacao_id)
        .bind(DeliveryStatus::Cancelado.as_str())
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Idempotent read confirmation for one (notification, user) chain.
    ///
    /// Marks the matching delivery `lido`, appends at most one read receipt
    /// per channel, cancels the rest of the cascade chain, and bumps
    /// `stats_lidos` only on the chain's first read — all in one
    /// transaction. Returns `true` when this call performed the first read.
    pub async fn confirm_read(
        pool: &PgPool,
        notificacao_id: DbId,
        usuario_id: DbId,
        canal: Channel,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let already_read: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM notificacoes_entregas \
                 WHERE notificacao_id = $1 AND usuario_id = $2 AND lida_em IS NOT NULL \
             )",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .fetch_one(&mut *tx)
        .await?;

        // Audit trail: at most one receipt per channel.
        sqlx::query(
            "INSERT INTO notificacoes_leituras \
                 (notificacao_id, usuario_id, canal, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_leitura_canal DO NOTHING",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .bind(canal.as_str())
        .bind(ip_address)
        .bind(user_agent)
        .execute(&mut *tx)
        .await?;

        if already_read {
            tx.commit().await?;
            return Ok(false);
        }

        // Prefer the delivery on the acknowledging channel; fall back to
        // any sent row in the chain (a read can arrive through a channel
        // whose own delivery row never existed, e.g. a forwarded link).
        let marked: Option<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $4, lida_em = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM notificacoes_entregas \
                 WHERE notificacao_id = $1 AND usuario_id = $2 \
                   AND lida_em IS NULL AND status IN ($5, $6) \
                 ORDER BY (canal = $3) DESC, cascata_nivel DESC \
                 LIMIT 1 \
             ) \
             RETURNING id",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .bind(canal.as_str())
        .bind(DeliveryStatus::Lido.as_str())
        .bind(DeliveryStatus::Enviado.as_str())
        .bind(DeliveryStatus::Entregue.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if marked.is_none() {
            // Nothing in the chain was ever sent; record the receipt only.
            tx.commit().await?;
            return Ok(false);
        }

        // The acknowledgement satisfies the whole chain: stop pending
        // levels and take the sent ones out of the escalation scanner.
        sqlx::query(
            "DELETE FROM notificacoes_fila f \
             USING notificacoes_entregas e \
             WHERE f.entrega_id = e.id \
               AND e.notificacao_id = $1 AND e.usuario_id = $2",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE notificacoes_entregas \
             SET status = $3, updated_at = NOW() \
             WHERE notificacao_id = $1 AND usuario_id = $2 AND status IN ($4, $5)",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .bind(DeliveryStatus::Cancelado.as_str())
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE notificacoes_entregas \
             SET escalada = TRUE, updated_at = NOW() \
             WHERE notificacao_id = $1 AND usuario_id = $2 AND NOT escalada",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .execute(&mut *tx)
        .await?;

        Self::bump_stat(&mut tx, notificacao_id, StatField::Lidos).await?;
        Self::close_if_settled(&mut tx, notificacao_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Whether any delivery in the chain has been read.
    pub async fn chain_has_read(
        pool: &PgPool,
        notificacao_id: DbId,
        usuario_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM notificacoes_entregas \
                 WHERE notificacao_id = $1 AND usuario_id = $2 AND lida_em IS NOT NULL \
             )",
        )
        .bind(notificacao_id)
        .bind(usuario_id)
        .fetch_one(pool)
        .await
    }

    /// Sent-but-unread deliveries not yet handled by the escalation
    /// scanner, oldest first, joined with the notification fields the
    /// cascade policy needs. Cancelled notifications are excluded.
    pub async fn escalation_candidates(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<EscalationCandidate>, sqlx::Error> {
        sqlx::query_as::<_, EscalationCandidate>(
            "SELECT e.id AS entrega_id, e.notificacao_id, e.usuario_id, \
                    n.condominio_id, e.canal, e.cascata_nivel, e.enviada_em, \
                    n.tipo, n.prioridade \
             FROM notificacoes_entregas e \
             JOIN notificacoes n ON n.id = e.notificacao_id \
             WHERE e.status IN ($1, $2) AND NOT e.escalada \
               AND e.lida_em IS NULL AND e.enviada_em IS NOT NULL \
               AND n.cancelada_em IS NULL \
             ORDER BY e.enviada_em ASC \
             LIMIT $3",
        )
        .bind(DeliveryStatus::Enviado.as_str())
        .bind(DeliveryStatus::Entregue.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Take a delivery out of the escalation scanner's view.
    pub async fn mark_escalada(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes_entregas SET escalada = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Scheduled deliveries whose send time has arrived.
    pub async fn due_scheduled(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Delivery>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notificacoes_entregas \
             WHERE status = $1 AND agendada_para IS NOT NULL AND agendada_para <= $2 \
             ORDER BY agendada_para ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Delivery>(&query)
            .bind(DeliveryStatus::Agendado.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Promote a due scheduled delivery to `pendente`.
    pub async fn mark_ready(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notificacoes_entregas \
             SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every unread in-app delivery of a user as read, keeping
    /// per-notification counters consistent. Returns how many were marked.
    pub async fn mark_all_read_in_app(pool: &PgPool, usuario_id: DbId) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let notification_ids: Vec<DbId> = sqlx::query_scalar(
            "UPDATE notificacoes_entregas \
             SET status = $2, lida_em = NOW(), escalada = TRUE, updated_at = NOW() \
             WHERE usuario_id = $1 AND canal = $3 \
               AND lida_em IS NULL AND status IN ($4, $5) \
             RETURNING notificacao_id",
        )
        .bind(usuario_id)
        .bind(DeliveryStatus::Lido.as_str())
        .bind(Channel::InApp.as_str())
        .bind(DeliveryStatus::Enviado.as_str())
        .bind(DeliveryStatus::Entregue.as_str())
        .fetch_all(&mut *tx)
        .await?;

        for nid in &notification_ids {
            // Only the chain's first read bumps the counter.
            let reads_in_chain: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM notificacoes_entregas \
                 WHERE notificacao_id = $1 AND usuario_id = $2 AND lida_em IS NOT NULL",
            )
            .bind(nid)
            .bind(usuario_id)
            .fetch_one(&mut *tx)
            .await?;
            if reads_in_chain == 1 {
                Self::bump_stat(&mut tx, *nid, StatField::Lidos).await?;
            }
        }

        tx.commit().await?;
        Ok(notification_ids.len() as u64)
    }

    /// Flip a dispatching notification to `enviado` once no delivery
    /// remains attemptable, inside the caller's transaction.
    ///
    /// Escalation rows created afterwards do not reopen the status; the
    /// `stats_*` counters stay the precise view of delivery progress.
    async fn close_if_settled(
        tx: &mut Transaction<'_, Postgres>,
        notificacao_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes \
             SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3 AND cancelada_em IS NULL \
               AND NOT EXISTS ( \
                   SELECT 1 FROM notificacoes_entregas \
                   WHERE notificacao_id = $1 AND status IN ($3, $4, $5) \
               )",
        )
        .bind(notificacao_id)
        .bind(DeliveryStatus::Enviado.as_str())
        .bind(DeliveryStatus::Enviando.as_str())
        .bind(DeliveryStatus::Pendente.as_str())
        .bind(DeliveryStatus::Agendado.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Atomic increment of one denormalized notification counter, inside
    /// the caller's transaction.
    async fn bump_stat(
        tx: &mut Transaction<'_, Postgres>,
        notificacao_id: DbId,
        field: StatField,
    ) -> Result<(), sqlx::Error> {
        let column = field.column();
        let query = format!(
            "UPDATE notificacoes SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1"
        );
        sqlx::query(&query)
            .bind(notificacao_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
