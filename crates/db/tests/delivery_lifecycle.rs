//! Integration tests for the delivery state machine.
//!
//! Exercises the repository layer against a real database:
//! - Fan-out creation and the per-level uniqueness guard
//! - Attempt lifecycle and counter synchronization
//! - Idempotent read confirmation and chain cancellation
//! - Bulk cancellation of a notification

use chrono::Utc;
use sqlx::PgPool;

use portaria_core::audience::AudienceFilter;
use portaria_core::channel::Channel;
use portaria_core::status::{DeliveryStatus, NotificationType, Priority};
use portaria_db::models::delivery::NewDelivery;
use portaria_db::models::notification::NewNotification;
use portaria_db::repositories::{DeliveryRepo, NotificationRepo, QueueRepo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_tenant(pool: &PgPool) -> (i64, i64) {
    let condominio_id: i64 =
        sqlx::query_scalar("INSERT INTO condominios (nome) VALUES ('Ed. Aurora') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    let usuario_id: i64 = sqlx::query_scalar(
        "INSERT INTO usuarios (condominio_id, nome, email) \
         VALUES ($1, 'Maria', 'maria@example.com') RETURNING id",
    )
    .bind(condominio_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (condominio_id, usuario_id)
}

fn new_notification(condominio_id: i64, criado_por: i64) -> NewNotification {
    NewNotification {
        condominio_id,
        criado_por: Some(criado_por),
        tipo: NotificationType::Aviso,
        titulo: "Manutenção do elevador".to_string(),
        corpo: "O elevador social ficará parado amanhã.".to_string(),
        prioridade: Priority::Alta,
        audiencia: AudienceFilter::Todos,
        agendada_para: None,
        gerar_mural: false,
    }
}

fn new_delivery(notificacao_id: i64, usuario_id: i64, canal: Channel, nivel: i16) -> NewDelivery {
    NewDelivery {
        notificacao_id,
        usuario_id,
        canal,
        status: DeliveryStatus::Pendente,
        cascata_nivel: nivel,
        canal_origem: None,
        max_tentativas: 3,
        agendada_para: None,
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn create_is_idempotent_per_cascade_level(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();

    let first = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap();
    assert!(first.is_some());

    // Same (notification, user, channel, level) silently dedupes.
    let second = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap();
    assert!(second.is_none());

    // A higher cascade level on the same channel is a distinct row.
    let escalated = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 1),
    )
    .await
    .unwrap();
    assert!(escalated.is_some());
}

// ---------------------------------------------------------------------------
// Attempt lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn begin_attempt_guards_double_processing(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();
    let delivery = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Email, 0),
    )
    .await
    .unwrap()
    .unwrap();

    let claimed = DeliveryRepo::begin_attempt(&pool, delivery.id).await.unwrap();
    let claimed = claimed.expect("pendente delivery should be attemptable");
    assert_eq!(claimed.status().unwrap(), DeliveryStatus::Enviando);
    assert_eq!(claimed.tentativas, 1);

    // A second worker arriving after a stale lease finds nothing to do.
    let again = DeliveryRepo::begin_attempt(&pool, delivery.id).await.unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn sent_and_failed_keep_counters_in_sync(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();

    let sent = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap()
    .unwrap();
    let failed = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Email, 0),
    )
    .await
    .unwrap()
    .unwrap();

    DeliveryRepo::begin_attempt(&pool, sent.id).await.unwrap();
    DeliveryRepo::record_sent(&pool, sent.id, Some("prov-1"), None, None)
        .await
        .unwrap();

    DeliveryRepo::begin_attempt(&pool, failed.id).await.unwrap();
    DeliveryRepo::record_failed(&pool, failed.id, "provider_rejected", "bounced")
        .await
        .unwrap();

    let stats = NotificationRepo::stats(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.stats_enviados, 1);
    assert_eq!(stats.stats_falhas, 1);
    assert_eq!(stats.stats_entregues, 0);

    let delivered = DeliveryRepo::record_delivered(&pool, sent.id).await.unwrap();
    assert!(delivered);
    // Delivery confirmations are idempotent.
    assert!(!DeliveryRepo::record_delivered(&pool, sent.id).await.unwrap());

    let stats = NotificationRepo::stats(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.stats_entregues, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn retry_returns_delivery_to_pending(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();
    let delivery = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Whatsapp, 0),
    )
    .await
    .unwrap()
    .unwrap();

    DeliveryRepo::begin_attempt(&pool, delivery.id).await.unwrap();
    let next = Utc::now() + chrono::Duration::seconds(30);
    DeliveryRepo::record_retry(&pool, delivery.id, "timeout", "gateway timeout", next)
        .await
        .unwrap();

    let row = DeliveryRepo::find_by_id(&pool, delivery.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status().unwrap(), DeliveryStatus::Pendente);
    assert_eq!(row.tentativas, 1);
    assert!(row.proxima_tentativa.is_some());

    // Transient errors do not touch the failure counter.
    let stats = NotificationRepo::stats(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.stats_falhas, 0);
}

// ---------------------------------------------------------------------------
// Read confirmation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn confirm_read_is_idempotent_and_stops_the_cascade(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();

    // Level 0 was sent; level 1 is still waiting in the queue.
    let sent = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap()
    .unwrap();
    DeliveryRepo::begin_attempt(&pool, sent.id).await.unwrap();
    DeliveryRepo::record_sent(&pool, sent.id, None, None, None)
        .await
        .unwrap();

    let pending = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Email, 1),
    )
    .await
    .unwrap()
    .unwrap();
    QueueRepo::enqueue(&pool, pending.id, 30, Utc::now()).await.unwrap();

    let first = DeliveryRepo::confirm_read(
        &pool,
        notification.id,
        usuario_id,
        Channel::Push,
        Some("10.0.0.1"),
        None,
    )
    .await
    .unwrap();
    assert!(first);

    // Replays are acknowledged but change nothing.
    let replay = DeliveryRepo::confirm_read(
        &pool,
        notification.id,
        usuario_id,
        Channel::Push,
        Some("10.0.0.1"),
        None,
    )
    .await
    .unwrap();
    assert!(!replay);

    let stats = NotificationRepo::stats(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.stats_lidos, 1);

    // The waiting level was cancelled and dequeued.
    let row = DeliveryRepo::find_by_id(&pool, pending.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status().unwrap(), DeliveryStatus::Cancelado);
    assert!(QueueRepo::find_by_delivery(&pool, pending.id)
        .await
        .unwrap()
        .is_none());

    // One receipt per channel in the audit trail.
    let receipts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notificacoes_leituras WHERE notificacao_id = $1")
            .bind(notification.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(receipts, 1);

    assert!(DeliveryRepo::chain_has_read(&pool, notification.id, usuario_id)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn cancel_pending_clears_queue_and_unsent_levels(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();

    let sent = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap()
    .unwrap();
    DeliveryRepo::begin_attempt(&pool, sent.id).await.unwrap();
    DeliveryRepo::record_sent(&pool, sent.id, None, None, None)
        .await
        .unwrap();

    let pending = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Email, 0),
    )
    .await
    .unwrap()
    .unwrap();
    QueueRepo::enqueue(&pool, pending.id, 30, Utc::now()).await.unwrap();

    assert!(NotificationRepo::cancel(&pool, notification.id).await.unwrap());
    // Cancelling twice is a no-op.
    assert!(!NotificationRepo::cancel(&pool, notification.id).await.unwrap());

    let cancelled = DeliveryRepo::cancel_pending(&pool, notification.id)
        .await
        .unwrap();
    assert_eq!(cancelled, 1);

    // Sent history is preserved; only unsent work is cancelled.
    let sent_row = DeliveryRepo::find_by_id(&pool, sent.id).await.unwrap().unwrap();
    assert_eq!(sent_row.status().unwrap(), DeliveryStatus::Enviado);
    let pending_row = DeliveryRepo::find_by_id(&pool, pending.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending_row.status().unwrap(), DeliveryStatus::Cancelado);
    assert_eq!(QueueRepo::depth(&pool).await.unwrap(), 0);

    assert!(NotificationRepo::is_cancelled(&pool, notification.id)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn notification_settles_once_all_deliveries_finish(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notification = NotificationRepo::create(&pool, &new_notification(condominio_id, usuario_id))
        .await
        .unwrap();
    NotificationRepo::mark_dispatched(&pool, notification.id, 1)
        .await
        .unwrap();

    let push = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Push, 0),
    )
    .await
    .unwrap()
    .unwrap();
    let email = DeliveryRepo::create(
        &pool,
        &new_delivery(notification.id, usuario_id, Channel::Email, 0),
    )
    .await
    .unwrap()
    .unwrap();

    DeliveryRepo::begin_attempt(&pool, push.id).await.unwrap().unwrap();
    DeliveryRepo::record_sent(&pool, push.id, Some("prov-1"), None, None)
        .await
        .unwrap();

    // One delivery is still attemptable, so the notification stays open.
    let n = NotificationRepo::find_by_id(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n.status().unwrap(), DeliveryStatus::Enviando);

    DeliveryRepo::begin_attempt(&pool, email.id).await.unwrap().unwrap();
    DeliveryRepo::record_failed(&pool, email.id, "invalid_address", "mailbox does not exist")
        .await
        .unwrap();

    let n = NotificationRepo::find_by_id(&pool, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n.status().unwrap(), DeliveryStatus::Enviado);
}
