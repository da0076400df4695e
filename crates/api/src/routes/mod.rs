pub mod health;
pub mod notification;
pub mod tenant;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /notificacoes                      POST create, emergency/cancel/read below
/// /inbox/{usuario_id}                inbox reads
/// /condominios/{id}/config           tenant channel policy
/// /usuarios/{id}/preferencias        per-user channel preferences
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(notification::router())
        .merge(tenant::router())
}
