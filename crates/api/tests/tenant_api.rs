//! Integration tests for tenant config, quota, and preference endpoints.

mod common;

use axum::http::StatusCode;
use common::{expect_json, get, put_json, seed_tenant};
use sqlx::PgPool;

#[sqlx::test(migrations = "../db/migrations")]
async fn tenant_config_is_created_lazily(pool: PgPool) {
    let (condominio_id, _) = seed_tenant(&pool).await;
    let app = common::build_test_app(pool);

    let json = expect_json(
        get(app, &format!("/api/v1/condominios/{condominio_id}/config")).await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(json["data"]["condominio_id"], condominio_id);
    assert_eq!(json["data"]["push_habilitado"], true);
    assert_eq!(json["data"]["cascata_habilitada"], false);
    assert_eq!(json["data"]["tempo_push_para_email"], 5);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn tenant_config_partial_update(pool: PgPool) {
    let (condominio_id, _) = seed_tenant(&pool).await;
    let app = common::build_test_app(pool);

    let uri = format!("/api/v1/condominios/{condominio_id}/config");
    let json = expect_json(
        put_json(
            app.clone(),
            &uri,
            serde_json::json!({
                "whatsapp_habilitado": true,
                "creditos_whatsapp": 500,
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(json["data"]["whatsapp_habilitado"], true);
    assert_eq!(json["data"]["creditos_whatsapp"], 500);
    // Untouched fields keep their defaults.
    assert_eq!(json["data"]["email_habilitado"], true);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn quota_reports_usage_and_limits(pool: PgPool) {
    let (condominio_id, _) = seed_tenant(&pool).await;
    let app = common::build_test_app(pool);

    let json = expect_json(
        get(app, &format!("/api/v1/condominios/{condominio_id}/cota")).await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(json["data"]["uso"]["uso_whatsapp"], 0);
    assert!(json["data"]["limites"]["push"].is_number());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn preferences_update_round_trip(pool: PgPool) {
    let (_, usuario_id) = seed_tenant(&pool).await;
    let app = common::build_test_app(pool);

    let uri = format!("/api/v1/usuarios/{usuario_id}/preferencias");

    // Defaults row is created lazily on first read.
    let json = expect_json(get(app.clone(), &uri).await, StatusCode::OK).await;
    assert_eq!(json["data"]["push_habilitado"], true);
    assert_eq!(json["data"]["whatsapp_verificado"], false);

    let json = expect_json(
        put_json(
            app,
            &uri,
            serde_json::json!({
                "sms_habilitado": true,
                "sms_numero": "+5511999990000",
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    assert_eq!(json["data"]["sms_habilitado"], true);
    assert_eq!(json["data"]["sms_numero"], "+5511999990000");
}
