//! Cascade escalation scanner.
//!
//! Periodically sweeps sent-but-unread deliveries. When a level's wait
//! timer elapses without an acknowledgement, the chain either escalates to
//! the next eligible channel (a new delivery row at `cascata_nivel + 1`)
//! or is marked exhausted. A read anywhere in the chain stops it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use portaria_core::cascade::{CascadePolicy, CascadeStep};
use portaria_core::channel::Channel;
use portaria_core::status::DeliveryStatus;
use portaria_db::models::delivery::{EscalationCandidate, NewDelivery};
use portaria_db::repositories::{DeliveryRepo, PreferenceRepo, QueueRepo, TenantConfigRepo};

use crate::bus::{EngineBus, EngineEvent};
use crate::dispatcher::queue_priority;
use crate::error::EngineError;

/// Scan cadence.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Candidates examined per sweep.
const SCAN_BATCH: i64 = 200;

/// Retry budget for escalation deliveries, same as fan-out rows.
const ESCALATION_MAX_ATTEMPTS: i16 = 3;

/// Periodic escalation sweeper. Exactly one instance should run per
/// deployment; the `escalada` flag makes duplicate instances harmless.
pub struct CascadeScanner {
    pool: PgPool,
    bus: Arc<EngineBus>,
    interval: Duration,
}

impl CascadeScanner {
    pub fn new(pool: PgPool, bus: Arc<EngineBus>) -> Self {
        Self {
            pool,
            bus,
            interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep loop until cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval_s = self.interval.as_secs(), "Cascade scanner started");
        loop {
            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "Cascade sweep failed");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Cascade scanner stopped");
    }

    /// Examine one batch of candidates.
    pub async fn sweep(&self) -> Result<(), EngineError> {
        let candidates = DeliveryRepo::escalation_candidates(&self.pool, SCAN_BATCH).await?;
        for candidate in candidates {
            if let Err(e) = self.consider(&candidate).await {
                tracing::error!(
                    entrega_id = candidate.entrega_id,
                    error = %e,
                    "Escalation decision failed"
                );
            }
        }
        Ok(())
    }

    /// Decide one candidate: wait longer, stop, escalate, or exhaust.
    async fn consider(&self, candidate: &EscalationCandidate) -> Result<(), EngineError> {
        let canal = candidate.canal()?;
        let tipo = candidate.tipo()?;
        let prioridade = candidate.prioridade()?;

        let tenant = TenantConfigRepo::get_or_default(&self.pool, candidate.condominio_id).await?;
        let policy = tenant.cascade_policy();

        if !policy.engages(tipo, prioridade) {
            // Not a cascading notification; stop revisiting it.
            DeliveryRepo::mark_escalada(&self.pool, candidate.entrega_id).await?;
            return Ok(());
        }

        if !policy.order.contains(&canal) {
            // The in_app inbox row and directly selected channels sit
            // outside the chain; they neither escalate nor exhaust it.
            DeliveryRepo::mark_escalada(&self.pool, candidate.entrega_id).await?;
            return Ok(());
        }

        let wait = chrono::Duration::from_std(policy.wait_at(canal))
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        if Utc::now() < candidate.enviada_em + wait {
            // Timer still running.
            return Ok(());
        }

        if DeliveryRepo::chain_has_read(&self.pool, candidate.notificacao_id, candidate.usuario_id)
            .await?
        {
            DeliveryRepo::mark_escalada(&self.pool, candidate.entrega_id).await?;
            return Ok(());
        }

        match self.next_eligible(&policy, canal, &tenant, candidate).await? {
            Some(next) => self.escalate(candidate, canal, next, prioridade).await,
            None => self.exhaust(candidate).await,
        }
    }

    /// Walk the chain past `current` to the first channel both the tenant
    /// and the recipient have enabled.
    async fn next_eligible(
        &self,
        policy: &CascadePolicy,
        current: Channel,
        tenant: &portaria_db::models::tenant_config::TenantConfig,
        candidate: &EscalationCandidate,
    ) -> Result<Option<Channel>, EngineError> {
        let prefs = PreferenceRepo::get_or_default(&self.pool, candidate.usuario_id).await?;
        let mut cursor = current;
        loop {
            match policy.step_after(cursor) {
                CascadeStep::Escalate(next) => {
                    if tenant.channel_enabled(next) && prefs.channel_opted_in(next) {
                        return Ok(Some(next));
                    }
                    cursor = next;
                }
                CascadeStep::Exhaust => return Ok(None),
            }
        }
    }

    async fn escalate(
        &self,
        candidate: &EscalationCandidate,
        from: Channel,
        to: Channel,
        prioridade: portaria_core::status::Priority,
    ) -> Result<(), EngineError> {
        let created = DeliveryRepo::create(
            &self.pool,
            &NewDelivery {
                notificacao_id: candidate.notificacao_id,
                usuario_id: candidate.usuario_id,
                canal: to,
                status: DeliveryStatus::Pendente,
                cascata_nivel: candidate.cascata_nivel + 1,
                canal_origem: Some(from),
                max_tentativas: ESCALATION_MAX_ATTEMPTS,
                agendada_para: None,
            },
        )
        .await?;

        // The unique level constraint absorbs scanner races: only the
        // instance that inserted the row enqueues and emits.
        if let Some(delivery) = created {
            QueueRepo::enqueue(
                &self.pool,
                delivery.id,
                queue_priority(prioridade, true),
                Utc::now(),
            )
            .await?;
            tracing::info!(
                notificacao_id = candidate.notificacao_id,
                usuario_id = candidate.usuario_id,
                de = %from,
                para = %to,
                nivel = delivery.cascata_nivel,
                "Cascade escalated"
            );
            self.bus.publish(
                EngineEvent::new("cascata.escalada")
                    .with_tenant(candidate.condominio_id)
                    .with_notification(candidate.notificacao_id)
                    .with_payload(serde_json::json!({
                        "usuario_id": candidate.usuario_id,
                        "de": from.as_str(),
                        "para": to.as_str(),
                        "nivel": delivery.cascata_nivel,
                    })),
            );
        }
        DeliveryRepo::mark_escalada(&self.pool, candidate.entrega_id).await?;
        Ok(())
    }

    async fn exhaust(&self, candidate: &EscalationCandidate) -> Result<(), EngineError> {
        DeliveryRepo::mark_escalada(&self.pool, candidate.entrega_id).await?;
        tracing::info!(
            notificacao_id = candidate.notificacao_id,
            usuario_id = candidate.usuario_id,
            canal = %candidate.canal,
            "Cascade exhausted without acknowledgement"
        );
        self.bus.publish(
            EngineEvent::new("cascata.esgotada")
                .with_tenant(candidate.condominio_id)
                .with_notification(candidate.notificacao_id)
                .with_payload(serde_json::json!({
                    "usuario_id": candidate.usuario_id,
                    "ultimo_canal": candidate.canal,
                })),
        );
        Ok(())
    }
}
