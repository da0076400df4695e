//! Route definitions for the `/notificacoes` and `/inbox` resources.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted under `/api/v1`.
///
/// ```text
/// POST   /notificacoes                       -> create_notification
/// POST   /notificacoes/emergencia            -> trigger_emergency
/// GET    /notificacoes/{id}                  -> get_notification
/// GET    /notificacoes/{id}/stats            -> notification_stats
/// POST   /notificacoes/{id}/cancelar         -> cancel_notification
/// POST   /notificacoes/{id}/leitura          -> confirm_read
///
/// GET    /inbox/{usuario_id}                 -> list_inbox
/// GET    /inbox/{usuario_id}/nao-lidas       -> unread_count
/// POST   /inbox/{usuario_id}/marcar-todas-lidas -> mark_all_read
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notificacoes", post(notification::create_notification))
        .route(
            "/notificacoes/emergencia",
            post(notification::trigger_emergency),
        )
        .route("/notificacoes/{id}", get(notification::get_notification))
        .route(
            "/notificacoes/{id}/stats",
            get(notification::notification_stats),
        )
        .route(
            "/notificacoes/{id}/cancelar",
            post(notification::cancel_notification),
        )
        .route("/notificacoes/{id}/leitura", post(notification::confirm_read))
        .route("/inbox/{usuario_id}", get(notification::list_inbox))
        .route(
            "/inbox/{usuario_id}/nao-lidas",
            get(notification::unread_count),
        )
        .route(
            "/inbox/{usuario_id}/marcar-todas-lidas",
            post(notification::mark_all_read),
        )
}
