//! Repository for the `notificacoes_fila` work queue.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` inside a single `UPDATE`, so any
//! number of workers can poll concurrently without handing the same entry
//! to two of them. Leases bound how long a crashed worker can hold an
//! entry; expired leases make the entry claimable again.

use std::time::Duration;

use sqlx::PgPool;

use portaria_core::types::{DbId, Timestamp};

use crate::models::queue::{ClaimedEntry, QueueEntry};

/// Provides enqueue/claim/release operations for delivery work.
pub struct QueueRepo;

impl QueueRepo {
    /// Enqueue a delivery, or refresh priority and due time if it is
    /// already queued. One queue row per delivery.
    pub async fn enqueue(
        pool: &PgPool,
        entrega_id: DbId,
        prioridade: i32,
        processar_apos: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notificacoes_fila (entrega_id, prioridade, processar_apos) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_fila_entrega DO UPDATE \
             SET prioridade = EXCLUDED.prioridade, \
                 processar_apos = EXCLUDED.processar_apos, \
                 processando = FALSE, processando_por = NULL, \
                 processando_desde = NULL, lease_expira_em = NULL",
        )
        .bind(entrega_id)
        .bind(prioridade)
        .bind(processar_apos)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Claim the next due entry for `worker_id`, taking a lease.
    ///
    /// Picks the highest-priority entry whose `processar_apos` has passed
    /// and which is either unclaimed or holds an expired lease. Returns
    /// `None` when the queue has no due work.
    pub async fn claim_next(
        pool: &PgPool,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<ClaimedEntry>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedEntry>(
            "UPDATE notificacoes_fila \
             SET processando = TRUE, processando_por = $1, processando_desde = NOW(), \
                 lease_expira_em = NOW() + make_interval(secs => $2) \
             WHERE id = ( \
                 SELECT id FROM notificacoes_fila \
                 WHERE processar_apos <= NOW() \
                   AND (NOT processando OR lease_expira_em < NOW()) \
                 ORDER BY prioridade DESC, processar_apos ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, entrega_id, lease_expira_em",
        )
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(pool)
        .await
    }

    /// Remove a processed entry. The queue row exists only while the
    /// delivery is awaiting an attempt.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM notificacoes_fila WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Put a claimed entry back with a new due time (retry backoff or
    /// quiet-hours deferral) and drop the lease.
    pub async fn reschedule(
        pool: &PgPool,
        id: DbId,
        processar_apos: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notificacoes_fila \
             SET processar_apos = $2, processando = FALSE, processando_por = NULL, \
                 processando_desde = NULL, lease_expira_em = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(processar_apos)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Extend the lease on a claimed entry (slow provider call in flight).
    pub async fn extend_lease(
        pool: &PgPool,
        id: DbId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notificacoes_fila \
             SET lease_expira_em = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND processando AND processando_por = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Look up a queue entry by the delivery it points at.
    pub async fn find_by_delivery(
        pool: &PgPool,
        entrega_id: DbId,
    ) -> Result<Option<QueueEntry>, sqlx::Error> {
        sqlx::query_as::<_, QueueEntry>(
            "SELECT id, entrega_id, prioridade, processar_apos, processando, \
                    processando_por, processando_desde, lease_expira_em, created_at \
             FROM notificacoes_fila WHERE entrega_id = $1",
        )
        .bind(entrega_id)
        .fetch_optional(pool)
        .await
    }

    /// Number of entries waiting (due or not). Exposed for health checks.
    pub async fn depth(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notificacoes_fila")
            .fetch_one(pool)
            .await
    }
}
