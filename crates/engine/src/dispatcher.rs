//! Delivery dispatcher: claims queue entries, runs the pre-send gates,
//! invokes the channel provider, and records the outcome.
//!
//! Any number of dispatchers can run concurrently against the same queue;
//! `FOR UPDATE SKIP LOCKED` claiming plus the `begin_attempt` status guard
//! keep each delivery with exactly one worker at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use portaria_core::backoff::{self, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use portaria_core::gates::{self, GateDecision};
use portaria_core::status::Priority;
use portaria_db::models::delivery::Delivery;
use portaria_db::models::notification::Notification;
use portaria_db::models::queue::ClaimedEntry;
use portaria_db::repositories::{
    DeliveryRepo, NotificationRepo, PreferenceRepo, QueueRepo, TenantConfigRepo,
};

use crate::bus::{EngineBus, EngineEvent};
use crate::error::EngineError;
use crate::quota;
use crate::sender::{SendOutcome, SendRequest, SenderRegistry};

/// How long a claim lease holds before a crashed worker's entry is
/// reclaimable.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Poll backoff when the queue has no due work.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(2);

/// One dispatch worker.
pub struct Dispatcher {
    pool: PgPool,
    registry: Arc<SenderRegistry>,
    bus: Arc<EngineBus>,
    worker_id: String,
    lease: Duration,
    idle_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        registry: Arc<SenderRegistry>,
        bus: Arc<EngineBus>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            registry,
            bus,
            worker_id: worker_id.into(),
            lease: DEFAULT_LEASE,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Claim-and-process loop until cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(worker_id = %self.worker_id, "Dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                claimed = QueueRepo::claim_next(&self.pool, &self.worker_id, self.lease) => {
                    match claimed {
                        Ok(Some(entry)) => {
                            if let Err(e) = self.process(&entry).await {
                                tracing::error!(
                                    worker_id = %self.worker_id,
                                    entrega_id = entry.entrega_id,
                                    error = %e,
                                    "Delivery processing failed; lease left to expire"
                                );
                            }
                        }
                        Ok(None) => {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(self.idle_backoff) => {}
                            }
                        }
                        Err(e) => {
                            tracing::error!(worker_id = %self.worker_id, error = %e, "Queue claim failed");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(self.idle_backoff) => {}
                            }
                        }
                    }
                }
            }
        }
        tracing::info!(worker_id = %self.worker_id, "Dispatcher stopped");
    }

    /// Process one claimed queue entry end to end.
    async fn process(&self, entry: &ClaimedEntry) -> Result<(), EngineError> {
        let Some(delivery) = DeliveryRepo::find_by_id(&self.pool, entry.entrega_id).await? else {
            // Orphaned queue row; the delivery is gone.
            QueueRepo::delete(&self.pool, entry.id).await?;
            return Ok(());
        };
        let Some(notification) =
            NotificationRepo::find_by_id(&self.pool, delivery.notificacao_id).await?
        else {
            QueueRepo::delete(&self.pool, entry.id).await?;
            return Ok(());
        };

        let canal = delivery.canal()?;
        let tipo = notification.tipo()?;
        let tenant = TenantConfigRepo::get_or_default(&self.pool, notification.condominio_id).await?;

        let now = Utc::now();
        let quota_ok = quota::available(&self.pool, &tenant, canal, now).await?;
        let decision = gates::evaluate(
            now,
            notification.is_cancelled(),
            tipo,
            canal,
            &tenant.quiet_gate(),
            quota_ok,
        );

        match decision {
            GateDecision::Cancelled => {
                DeliveryRepo::mark_cancelled(&self.pool, delivery.id).await?;
                QueueRepo::delete(&self.pool, entry.id).await?;
            }
            GateDecision::Deferred(until) => {
                tracing::debug!(
                    entrega_id = delivery.id,
                    until = %until,
                    "Delivery deferred by quiet hours"
                );
                QueueRepo::reschedule(&self.pool, entry.id, until).await?;
            }
            GateDecision::QuotaExceeded => {
                DeliveryRepo::record_failed(
                    &self.pool,
                    delivery.id,
                    "quota_exceeded",
                    "monthly channel quota exhausted",
                )
                .await?;
                QueueRepo::delete(&self.pool, entry.id).await?;
                self.publish_failed(&notification, &delivery, "quota_exceeded");
            }
            GateDecision::Proceed => {
                self.attempt(entry, &notification, &delivery).await?;
            }
        }
        Ok(())
    }

    /// Run one provider attempt for a gated-through delivery.
    async fn attempt(
        &self,
        entry: &ClaimedEntry,
        notification: &Notification,
        delivery: &Delivery,
    ) -> Result<(), EngineError> {
        let canal = delivery.canal()?;

        // Status guard: a competitor (expired-lease reclaim) may have
        // finished this delivery already.
        let Some(delivery) = DeliveryRepo::begin_attempt(&self.pool, delivery.id).await? else {
            QueueRepo::delete(&self.pool, entry.id).await?;
            return Ok(());
        };

        let request = self.build_request(notification, &delivery).await?;
        let tenant =
            TenantConfigRepo::get_or_default(&self.pool, notification.condominio_id).await?;

        let Some(outcome) = self.registry.send_with_timeout(canal, &request).await else {
            DeliveryRepo::record_failed(
                &self.pool,
                delivery.id,
                "channel_unconfigured",
                "no sender registered for channel",
            )
            .await?;
            QueueRepo::delete(&self.pool, entry.id).await?;
            self.publish_failed(notification, &delivery, "channel_unconfigured");
            return Ok(());
        };

        match outcome {
            SendOutcome::Accepted {
                provider_id,
                response,
                custo_centavos,
                units,
            } => {
                DeliveryRepo::record_sent(
                    &self.pool,
                    delivery.id,
                    provider_id.as_deref(),
                    response.as_ref(),
                    custo_centavos,
                )
                .await?;
                QueueRepo::delete(&self.pool, entry.id).await?;
                quota::commit(
                    &self.pool,
                    self.bus.as_ref(),
                    &tenant,
                    canal,
                    units,
                    custo_centavos.unwrap_or(0),
                    Utc::now(),
                )
                .await?;
                self.bus.publish(
                    EngineEvent::new("entrega.enviada")
                        .with_tenant(notification.condominio_id)
                        .with_notification(notification.id)
                        .with_payload(serde_json::json!({
                            "entrega_id": delivery.id,
                            "canal": canal.as_str(),
                            "cascata_nivel": delivery.cascata_nivel,
                        })),
                );
            }
            SendOutcome::Rejected { code, message } => {
                DeliveryRepo::record_failed(&self.pool, delivery.id, &code, &message).await?;
                QueueRepo::delete(&self.pool, entry.id).await?;
                self.publish_failed(notification, &delivery, &code);
            }
            SendOutcome::TransientError { code, message } => {
                if delivery.attempts_remaining() {
                    let delay = backoff::retry_delay(
                        delivery.tentativas as u32,
                        DEFAULT_BASE_DELAY,
                        DEFAULT_MAX_DELAY,
                        &mut rand::rng(),
                    );
                    let next = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    tracing::warn!(
                        entrega_id = delivery.id,
                        canal = %canal,
                        tentativa = delivery.tentativas,
                        erro = %code,
                        retry_em = %next,
                        "Transient delivery failure, retrying"
                    );
                    DeliveryRepo::record_retry(&self.pool, delivery.id, &code, &message, next)
                        .await?;
                    QueueRepo::reschedule(&self.pool, entry.id, next).await?;
                } else {
                    DeliveryRepo::record_failed(&self.pool, delivery.id, &code, &message).await?;
                    QueueRepo::delete(&self.pool, entry.id).await?;
                    self.publish_failed(notification, &delivery, "max_attempts");
                }
            }
        }
        Ok(())
    }

    /// Assemble the provider request from the recipient's contact data and
    /// the tenant's sender identity.
    async fn build_request(
        &self,
        notification: &Notification,
        delivery: &Delivery,
    ) -> Result<SendRequest, EngineError> {
        let usuario = PreferenceRepo::find_user(&self.pool, delivery.usuario_id)
            .await?
            .ok_or_else(|| EngineError::not_found("usuario", delivery.usuario_id))?;
        let prefs = PreferenceRepo::get_or_default(&self.pool, delivery.usuario_id).await?;
        let tenant =
            TenantConfigRepo::get_or_default(&self.pool, notification.condominio_id).await?;

        Ok(SendRequest {
            entrega_id: delivery.id,
            notificacao_id: notification.id,
            condominio_id: notification.condominio_id,
            tipo: notification.tipo()?,
            prioridade: notification.prioridade()?,
            titulo: notification.titulo.clone(),
            corpo: notification.corpo.clone(),
            destinatario_nome: usuario.nome,
            destinatario_email: usuario.email,
            whatsapp_numero: prefs.whatsapp_numero,
            sms_numero: prefs.sms_numero,
            voz_numero: prefs.voz_numero,
            push_tokens: prefs.push_tokens,
            email_remetente: tenant.email_remetente,
            email_nome_remetente: tenant.email_nome_remetente,
        })
    }

    fn publish_failed(&self, notification: &Notification, delivery: &Delivery, code: &str) {
        self.bus.publish(
            EngineEvent::new("entrega.falhou")
                .with_tenant(notification.condominio_id)
                .with_notification(notification.id)
                .with_payload(serde_json::json!({
                    "entrega_id": delivery.id,
                    "canal": delivery.canal,
                    "erro_codigo": code,
                })),
        );
    }
}

/// Queue priority for a delivery, accounting for cascade escalations.
pub fn queue_priority(prioridade: Priority, escalated: bool) -> i32 {
    if escalated {
        prioridade.escalated_queue_priority()
    } else {
        prioridade.queue_priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalations_outrank_their_base_priority_only() {
        assert_eq!(queue_priority(Priority::Normal, false), 20);
        assert_eq!(queue_priority(Priority::Normal, true), 25);
        assert!(queue_priority(Priority::Normal, true) < queue_priority(Priority::Alta, false));
    }
}
