//! Notification service facade.
//!
//! The API layer talks to the engine through this type: creation with
//! fan-out, cancellation, read confirmation, stats, and inbox reads. All
//! queue and counter bookkeeping stays behind the repositories.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use portaria_core::status::{DeliveryStatus, NotificationType, Priority};
use portaria_core::types::{DbId, Timestamp};
use portaria_db::models::delivery::NewDelivery;
use portaria_db::models::notification::{
    InboxItem, NewNotification, Notification, NotificationStats,
};
use portaria_db::repositories::{DeliveryRepo, NotificationRepo, QueueRepo, TenantConfigRepo};

use crate::bus::{EngineBus, EngineEvent};
use crate::dispatcher::queue_priority;
use crate::error::EngineError;
use crate::resolver;

/// Retry budget for fan-out delivery rows.
const DEFAULT_MAX_ATTEMPTS: i16 = 3;

/// Maximum title length accepted from clients.
const MAX_TITULO_LEN: usize = 200;

/// Engine entry point shared across API handlers.
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    bus: Arc<EngineBus>,
}

impl NotificationService {
    pub fn new(pool: PgPool, bus: Arc<EngineBus>) -> Self {
        Self { pool, bus }
    }

    pub fn bus(&self) -> &Arc<EngineBus> {
        &self.bus
    }

    /// Create a notification and fan out its deliveries.
    ///
    /// Immediate notifications are enqueued right away; scheduled ones get
    /// `agendado` delivery rows that the promoter releases later. An
    /// audience that resolves to nobody completes the notification
    /// immediately instead of failing it.
    pub async fn create_notification(
        &self,
        input: NewNotification,
    ) -> Result<Notification, EngineError> {
        validate(&input)?;

        let notification = NotificationRepo::create(&self.pool, &input).await?;
        let tenant = TenantConfigRepo::get_or_default(&self.pool, input.condominio_id).await?;

        let recipients = resolver::resolve(
            &self.pool,
            input.condominio_id,
            &input.audiencia,
            input.tipo,
            &tenant,
        )
        .await?;

        if recipients.is_empty() {
            NotificationRepo::mark_completed_empty(&self.pool, notification.id).await?;
            tracing::info!(
                notificacao_id = notification.id,
                "Notification audience resolved to nobody; completed empty"
            );
            self.publish_created(&notification, 0);
            return Ok(notification);
        }

        let scheduled = input.agendada_para.filter(|t| *t > Utc::now());
        let (status, agendada_para) = match scheduled {
            Some(t) => (DeliveryStatus::Agendado, Some(t)),
            None => (DeliveryStatus::Pendente, None),
        };
        let prioridade = input.prioridade;
        let total = recipients.len() as i32;

        let mural_delivery = input.gerar_mural
            && tenant.channel_enabled(portaria_core::channel::Channel::Mural);

        for recipient in &recipients {
            for canal in &recipient.canais {
                let created = DeliveryRepo::create(
                    &self.pool,
                    &NewDelivery {
                        notificacao_id: notification.id,
                        usuario_id: recipient.usuario.id,
                        canal: *canal,
                        status,
                        cascata_nivel: 0,
                        canal_origem: None,
                        max_tentativas: DEFAULT_MAX_ATTEMPTS,
                        agendada_para,
                    },
                )
                .await?;
                if let Some(delivery) = created {
                    if scheduled.is_none() {
                        QueueRepo::enqueue(
                            &self.pool,
                            delivery.id,
                            queue_priority(prioridade, false),
                            Utc::now(),
                        )
                        .await?;
                    }
                }
            }
        }

        // The mural posting is one physical artifact, recorded against the
        // creator rather than per recipient.
        if mural_delivery {
            if let Some(criado_por) = input.criado_por {
                let created = DeliveryRepo::create(
                    &self.pool,
                    &NewDelivery {
                        notificacao_id: notification.id,
                        usuario_id: criado_por,
                        canal: portaria_core::channel::Channel::Mural,
                        status,
                        cascata_nivel: 0,
                        canal_origem: None,
                        max_tentativas: 1,
                        agendada_para,
                    },
                )
                .await?;
                if let (Some(delivery), None) = (created, scheduled) {
                    QueueRepo::enqueue(
                        &self.pool,
                        delivery.id,
                        queue_priority(prioridade, false),
                        Utc::now(),
                    )
                    .await?;
                }
            }
        }

        if scheduled.is_none() {
            NotificationRepo::mark_dispatched(&self.pool, notification.id, total).await?;
        } else {
            NotificationRepo::set_total_destinatarios(&self.pool, notification.id, total).await?;
        }

        tracing::info!(
            notificacao_id = notification.id,
            tipo = %input.tipo,
            prioridade = %prioridade,
            destinatarios = total,
            agendada = scheduled.is_some(),
            "Notification fanned out"
        );
        self.publish_created(&notification, total);

        // Return the fresh row with status/total applied.
        Ok(NotificationRepo::find_by_id(&self.pool, notification.id)
            .await?
            .unwrap_or(notification))
    }

    /// Create and dispatch an emergency broadcast: forced type, critical
    /// priority, never scheduled.
    pub async fn trigger_emergency(
        &self,
        condominio_id: DbId,
        criado_por: Option<DbId>,
        titulo: String,
        corpo: String,
    ) -> Result<Notification, EngineError> {
        self.create_notification(NewNotification {
            condominio_id,
            criado_por,
            tipo: NotificationType::Emergencia,
            titulo,
            corpo,
            prioridade: Priority::Critica,
            audiencia: portaria_core::audience::AudienceFilter::Todos,
            agendada_para: None,
            gerar_mural: true,
        })
        .await
    }

    /// Cancel a notification and everything still unsent.
    ///
    /// Returns `false` when it was already cancelled. Deliveries already
    /// accepted by providers are untouched; cancellation only stops future
    /// work.
    pub async fn cancel_notification(&self, id: DbId) -> Result<bool, EngineError> {
        let notification = NotificationRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| EngineError::not_found("notificacao", id))?;

        if !NotificationRepo::cancel(&self.pool, id).await? {
            return Ok(false);
        }
        let stopped = DeliveryRepo::cancel_pending(&self.pool, id).await?;
        tracing::info!(notificacao_id = id, entregas_canceladas = stopped, "Notification cancelled");
        self.bus.publish(
            EngineEvent::new("notificacao.cancelada")
                .with_tenant(notification.condominio_id)
                .with_notification(id)
                .with_payload(serde_json::json!({ "entregas_canceladas": stopped })),
        );
        Ok(true)
    }

    /// Record a read acknowledgement. Idempotent; returns whether this call
    /// was the chain's first read.
    pub async fn confirm_read(
        &self,
        notificacao_id: DbId,
        usuario_id: DbId,
        canal: portaria_core::channel::Channel,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, EngineError> {
        let notification = NotificationRepo::find_by_id(&self.pool, notificacao_id)
            .await?
            .ok_or_else(|| EngineError::not_found("notificacao", notificacao_id))?;

        let newly_read = DeliveryRepo::confirm_read(
            &self.pool,
            notificacao_id,
            usuario_id,
            canal,
            ip_address,
            user_agent,
        )
        .await?;

        if newly_read {
            self.bus.publish(
                EngineEvent::new("entrega.lida")
                    .with_tenant(notification.condominio_id)
                    .with_notification(notificacao_id)
                    .with_payload(serde_json::json!({
                        "usuario_id": usuario_id,
                        "canal": canal.as_str(),
                    })),
            );
        }
        Ok(newly_read)
    }

    /// Per-notification delivery counters.
    pub async fn stats(&self, id: DbId) -> Result<NotificationStats, EngineError> {
        NotificationRepo::stats(&self.pool, id)
            .await?
            .ok_or_else(|| EngineError::not_found("notificacao", id))
    }

    /// A user's in-app inbox page.
    pub async fn inbox(
        &self,
        usuario_id: DbId,
        apenas_nao_lidas: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InboxItem>, EngineError> {
        let limit = limit.clamp(1, 100);
        Ok(NotificationRepo::list_inbox(
            &self.pool,
            usuario_id,
            apenas_nao_lidas,
            limit,
            offset.max(0),
        )
        .await?)
    }

    /// Unread badge count.
    pub async fn unread_count(&self, usuario_id: DbId) -> Result<i64, EngineError> {
        Ok(NotificationRepo::unread_count(&self.pool, usuario_id).await?)
    }

    /// Mark a user's entire inbox read; returns how many items changed.
    pub async fn mark_all_read(&self, usuario_id: DbId) -> Result<u64, EngineError> {
        Ok(DeliveryRepo::mark_all_read_in_app(&self.pool, usuario_id).await?)
    }

    fn publish_created(&self, notification: &Notification, total: i32) {
        self.bus.publish(
            EngineEvent::new("notificacao.criada")
                .with_tenant(notification.condominio_id)
                .with_notification(notification.id)
                .with_payload(serde_json::json!({
                    "tipo": notification.tipo,
                    "prioridade": notification.prioridade,
                    "destinatarios": total,
                })),
        );
    }
}

/// Creation-time validation, before any row is written.
fn validate(input: &NewNotification) -> Result<(), EngineError> {
    if input.titulo.trim().is_empty() {
        return Err(EngineError::validation("titulo must not be empty"));
    }
    if input.titulo.chars().count() > MAX_TITULO_LEN {
        return Err(EngineError::validation(format!(
            "titulo exceeds {MAX_TITULO_LEN} characters"
        )));
    }
    if input.corpo.trim().is_empty() {
        return Err(EngineError::validation("corpo must not be empty"));
    }
    input.audiencia.validate()?;
    if input.tipo.is_emergency() {
        if let Some(t) = input.agendada_para {
            if t > Utc::now() {
                return Err(EngineError::validation(
                    "emergencia notifications cannot be scheduled",
                ));
            }
        }
    }
    Ok(())
}

/// Scheduled-send guard reused by API input mapping: past instants are
/// treated as immediate rather than rejected.
pub fn normalize_schedule(agendada_para: Option<Timestamp>) -> Option<Timestamp> {
    agendada_para.filter(|t| *t > Utc::now())
}
