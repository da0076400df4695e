//! Scheduled-delivery promoter.
//!
//! Notifications created with a future `agendada_para` get their delivery
//! rows up front in `agendado`; this loop flips them to `pendente` and
//! enqueues them once the window arrives.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use portaria_db::repositories::{DeliveryRepo, NotificationRepo, QueueRepo};

use crate::dispatcher::queue_priority;
use crate::error::EngineError;

/// Promotion cadence.
pub const DEFAULT_PROMOTE_INTERVAL: Duration = Duration::from_secs(30);

/// Due deliveries promoted per pass.
const PROMOTE_BATCH: i64 = 500;

/// Periodic promoter for scheduled deliveries.
pub struct ScheduledPromoter {
    pool: PgPool,
    interval: Duration,
}

impl ScheduledPromoter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            interval: DEFAULT_PROMOTE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Promotion loop until cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval_s = self.interval.as_secs(), "Scheduled promoter started");
        loop {
            match self.promote_due().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(promoted = n, "Scheduled deliveries released"),
                Err(e) => tracing::error!(error = %e, "Scheduled promotion failed"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Scheduled promoter stopped");
    }

    /// Promote every due delivery once; returns how many were released.
    pub async fn promote_due(&self) -> Result<usize, EngineError> {
        let due = DeliveryRepo::due_scheduled(&self.pool, Utc::now(), PROMOTE_BATCH).await?;
        let mut promoted = 0;
        for delivery in due {
            // mark_ready is conditional, so concurrent promoters cannot
            // double-enqueue.
            if !DeliveryRepo::mark_ready(&self.pool, delivery.id).await? {
                continue;
            }
            let Some(notification) =
                NotificationRepo::find_by_id(&self.pool, delivery.notificacao_id).await?
            else {
                continue;
            };
            QueueRepo::enqueue(
                &self.pool,
                delivery.id,
                queue_priority(notification.prioridade()?, false),
                Utc::now(),
            )
            .await?;
            NotificationRepo::mark_sending(&self.pool, notification.id).await?;
            promoted += 1;
        }
        Ok(promoted)
    }
}
