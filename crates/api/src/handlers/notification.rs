//! Handlers for the `/notificacoes` and `/inbox` resources.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use portaria_core::audience::AudienceFilter;
use portaria_core::channel::Channel;
use portaria_core::status::{NotificationType, Priority};
use portaria_core::types::{DbId, Timestamp};
use portaria_db::models::notification::{InboxQuery, NewNotification};
use portaria_db::repositories::NotificationRepo;
use portaria_engine::service::normalize_schedule;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body for `POST /notificacoes`.
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub condominio_id: DbId,
    pub criado_por: Option<DbId>,
    pub tipo: NotificationType,
    pub titulo: String,
    pub corpo: String,
    /// Defaults to `normal`.
    pub prioridade: Option<Priority>,
    /// e.g. `{"tipo": "todos"}` or `{"tipo": "bloco", "filtro": [3, 7]}`.
    pub audiencia: AudienceFilter,
    pub agendada_para: Option<Timestamp>,
    /// Defaults to `false`.
    pub gerar_mural: Option<bool>,
}

/// Body for `POST /notificacoes/emergencia`.
#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    pub condominio_id: DbId,
    pub criado_por: Option<DbId>,
    pub titulo: String,
    pub corpo: String,
}

/// Body for `POST /notificacoes/{id}/leitura`.
#[derive(Debug, Deserialize)]
pub struct ReadReceiptRequest {
    pub usuario_id: DbId,
    /// Channel the user read through. Defaults to `in_app`.
    pub canal: Option<Channel>,
}

// ---------------------------------------------------------------------------
// Notification lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/notificacoes
///
/// Create a notification and fan out its deliveries. Scheduled sends with a
/// past `agendada_para` are dispatched immediately.
pub async fn create_notification(
    State(state): State<AppState>,
    Json(input): Json<CreateNotificationRequest>,
) -> AppResult<impl IntoResponse> {
    let notification = state
        .service
        .create_notification(NewNotification {
            condominio_id: input.condominio_id,
            criado_por: input.criado_por,
            tipo: input.tipo,
            titulo: input.titulo,
            corpo: input.corpo,
            prioridade: input.prioridade.unwrap_or(Priority::Normal),
            audiencia: input.audiencia,
            agendada_para: normalize_schedule(input.agendada_para),
            gerar_mural: input.gerar_mural.unwrap_or(false),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": notification })),
    ))
}

/// POST /api/v1/notificacoes/emergencia
///
/// Broadcast an emergency to everyone in the condominium: critical priority,
/// mural posting, never scheduled.
pub async fn trigger_emergency(
    State(state): State<AppState>,
    Json(input): Json<EmergencyRequest>,
) -> AppResult<impl IntoResponse> {
    let notification = state
        .service
        .trigger_emergency(
            input.condominio_id,
            input.criado_por,
            input.titulo,
            input.corpo,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": notification })),
    ))
}

/// GET /api/v1/notificacoes/{id}
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let notification = NotificationRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(portaria_core::error::CoreError::NotFound {
            entity: "notificacao",
            id,
        }))?;

    Ok(Json(serde_json::json!({ "data": notification })))
}

/// GET /api/v1/notificacoes/{id}/stats
///
/// Denormalized delivery counters for the dashboard.
pub async fn notification_stats(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let stats = state.service.stats(id).await?;

    Ok(Json(serde_json::json!({ "data": stats })))
}

/// POST /api/v1/notificacoes/{id}/cancelar
///
/// Cancel a notification and everything still unsent. Returns whether this
/// call performed the cancellation (`false` means it was already cancelled).
pub async fn cancel_notification(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let cancelled = state.service.cancel_notification(id).await?;

    Ok(Json(serde_json::json!({
        "data": { "cancelada": cancelled }
    })))
}

/// POST /api/v1/notificacoes/{id}/leitura
///
/// Record a read acknowledgement for a user. Idempotent: repeated reads
/// return `primeira_leitura: false` and change nothing.
pub async fn confirm_read(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    headers: HeaderMap,
    Json(input): Json<ReadReceiptRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ip_address = client_ip(&headers);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let newly_read = state
        .service
        .confirm_read(
            id,
            input.usuario_id,
            input.canal.unwrap_or(Channel::InApp),
            ip_address.as_deref(),
            user_agent,
        )
        .await?;

    Ok(Json(serde_json::json!({
        "data": { "primeira_leitura": newly_read }
    })))
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// GET /api/v1/inbox/{usuario_id}
///
/// A user's in-app inbox page, newest first.
pub async fn list_inbox(
    State(state): State<AppState>,
    Path(usuario_id): Path<DbId>,
    Query(params): Query<InboxQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let items = state
        .service
        .inbox(
            usuario_id,
            params.apenas_nao_lidas.unwrap_or(false),
            params.limit.unwrap_or(50),
            params.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(serde_json::json!({ "data": items })))
}

/// GET /api/v1/inbox/{usuario_id}/nao-lidas
pub async fn unread_count(
    State(state): State<AppState>,
    Path(usuario_id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let count = state.service.unread_count(usuario_id).await?;

    Ok(Json(serde_json::json!({
        "data": { "nao_lidas": count }
    })))
}

/// POST /api/v1/inbox/{usuario_id}/marcar-todas-lidas
pub async fn mark_all_read(
    State(state): State<AppState>,
    Path(usuario_id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let count = state.service.mark_all_read(usuario_id).await?;

    Ok(Json(serde_json::json!({
        "data": { "marcadas": count }
    })))
}

/// Best-effort client address: first hop of `X-Forwarded-For`, if present.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 172.16.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn client_ip_absent_when_header_missing() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
