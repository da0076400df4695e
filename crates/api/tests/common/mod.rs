//! Shared helpers for API integration tests.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use sqlx::PgPool;
use tower::ServiceExt;

use portaria_api::config::ServerConfig;
use portaria_api::router::build_app_router;
use portaria_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool. Mirrors the construction in `main.rs` so tests
/// exercise the same stack production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState::new(pool, config.clone());
    build_app_router(state, &config)
}

/// Perform a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Perform a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Perform a PUT request with a JSON body.
pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert status and return the parsed body in one step.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

/// Seed a tenant with one resident, returning `(condominio_id, usuario_id)`.
pub async fn seed_tenant(pool: &PgPool) -> (i64, i64) {
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
