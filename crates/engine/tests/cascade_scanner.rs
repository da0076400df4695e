//! Integration tests for the cascade escalation scanner.
//!
//! The chain walks the tenant's configured order; deliveries on channels
//! outside that order (the in-app inbox row, a directly selected send)
//! must never escalate or report the chain as exhausted.

use std::sync::Arc;

use sqlx::PgPool;

use portaria_core::audience::AudienceFilter;
use portaria_core::channel::Channel;
use portaria_core::status::{DeliveryStatus, NotificationType, Priority};
use portaria_db::models::delivery::NewDelivery;
use portaria_db::models::notification::NewNotification;
use portaria_db::repositories::{DeliveryRepo, NotificationRepo, TenantConfigRepo};
use portaria_engine::bus::EngineBus;
use portaria_engine::escalation::CascadeScanner;

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

    TenantConfigRepo::get_or_default(pool, condominio_id)
        .await
        .unwrap();
    sqlx::query("UPDATE notificacoes_config SET cascata_habilitada = TRUE WHERE condominio_id = $1")
        .bind(condominio_id)
        .execute(pool)
        .await
        .unwrap();

    (condominio_id, usuario_id)
}

async fn seed_notification(pool: &PgPool, condominio_id: i64, usuario_id: i64) -> i64 {
    NotificationRepo::create(
        pool,
        &NewNotification {
            condominio_id,
            criado_por: Some(usuario_id),
            tipo: NotificationType::Alerta,
            titulo: "Vazamento na garagem".to_string(),
            corpo: "Registro de vazamento no subsolo, evitem a vaga 12.".to_string(),
            prioridade: Priority::Alta,
            audiencia: AudienceFilter::Todos,
            agendada_para: None,
            gerar_mural: false,
        },
    )
    .await
    .unwrap()
    .id
}

/// Insert a delivery and backdate its send so the level timer has elapsed.
async fn seed_sent_delivery(
    pool: &PgPool,
    notificacao_id: i64,
    usuario_id: i64,
    canal: Channel,
    minutes_ago: i32,
) -> i64 {
    let delivery = DeliveryRepo::create(
        pool,
        &NewDelivery {
            notificacao_id,
            usuario_id,
            canal,
            status: DeliveryStatus::Pendente,
            cascata_nivel: 0,
            canal_origem: None,
            max_tentativas: 3,
            agendada_para: None,
        },
    )
    .await
    .unwrap()
    .unwrap();

    sqlx::query(
        "UPDATE notificacoes_entregas \
         SET status = 'enviado', enviada_em = NOW() - make_interval(mins => $2) \
         WHERE id = $1",
    )
    .bind(delivery.id)
    .bind(minutes_ago)
    .execute(pool)
    .await
    .unwrap();

    delivery.id
}

async fn delivery_count(pool: &PgPool, notificacao_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notificacoes_entregas WHERE notificacao_id = $1")
        .bind(notificacao_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scope of the chain
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn inbox_row_never_exhausts_the_chain(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notificacao_id = seed_notification(&pool, condominio_id, usuario_id).await;
    let entrega_id =
        seed_sent_delivery(&pool, notificacao_id, usuario_id, Channel::InApp, 60).await;

    let bus = Arc::new(EngineBus::default());
    let mut rx = bus.subscribe();
    CascadeScanner::new(pool.clone(), bus.clone())
        .sweep()
        .await
        .unwrap();

    // No escalation row, no exhaustion event; the row just leaves the
    // scanner's view.
    assert_eq!(delivery_count(&pool, notificacao_id).await, 1);
    assert!(rx.try_recv().is_err());
    let escalada: bool =
        sqlx::query_scalar("SELECT escalada FROM notificacoes_entregas WHERE id = $1")
            .bind(entrega_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(escalada);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unread_push_escalates_to_email(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notificacao_id = seed_notification(&pool, condominio_id, usuario_id).await;
    seed_sent_delivery(&pool, notificacao_id, usuario_id, Channel::Push, 60).await;

    let bus = Arc::new(EngineBus::default());
    let mut rx = bus.subscribe();
    CascadeScanner::new(pool.clone(), bus.clone())
        .sweep()
        .await
        .unwrap();

    let (canal, canal_origem): (String, Option<String>) = sqlx::query_as(
        "SELECT canal, canal_origem FROM notificacoes_entregas \
         WHERE notificacao_id = $1 AND cascata_nivel = 1",
    )
    .bind(notificacao_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(canal, "email");
    assert_eq!(canal_origem.as_deref(), Some("push"));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event_type, "cascata.escalada");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn chain_end_reports_exhaustion(pool: PgPool) {
    let (condominio_id, usuario_id) = seed_tenant(&pool).await;
    let notificacao_id = seed_notification(&pool, condominio_id, usuario_id).await;
    // SMS is the last channel of the default order.
    seed_sent_delivery(&pool, notificacao_id, usuario_id, Channel::Sms, 60).await;

    let bus = Arc::new(EngineBus::default());
    let mut rx = bus.subscribe();
    CascadeScanner::new(pool.clone(), bus.clone())
        .sweep()
        .await
        .unwrap();

    assert_eq!(delivery_count(&pool, notificacao_id).await, 1);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.event_type, "cascata.esgotada");
}
