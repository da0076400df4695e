//! Handlers for tenant channel policy, monthly quota, and per-user
//! channel preferences.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use portaria_core::types::DbId;
use portaria_db::models::preference::UpdatePreference;
use portaria_db::models::quota::month_reference;
use portaria_db::models::tenant_config::UpdateTenantConfig;
use portaria_db::repositories::{PreferenceRepo, QuotaRepo, TenantConfigRepo};

use crate::error::AppResult;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Tenant config
// ---------------------------------------------------------------------------

/// GET /api/v1/condominios/{id}/config
///
/// The tenant's channel policy. A defaults row is created lazily, so this
/// never 404s for a valid tenant id.
pub async fn get_tenant_config(
    State(state): State<AppState>,
    Path(condominio_id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let config = TenantConfigRepo::get_or_default(&state.pool, condominio_id).await?;

    Ok(Json(serde_json::json!({ "data": config })))
}

/// PUT /api/v1/condominios/{id}/config
///
/// Partial update: absent fields keep their current values.
pub async fn update_tenant_config(
    State(state): State<AppState>,
    Path(condominio_id): Path<DbId>,
    Json(input): Json<UpdateTenantConfig>,
) -> AppResult<Json<serde_json::Value>> {
    let config = TenantConfigRepo::update(&state.pool, condominio_id, &input).await?;

    tracing::info!(condominio_id, "Tenant notification config updated");

    Ok(Json(serde_json::json!({ "data": config })))
}

/// GET /api/v1/condominios/{id}/cota
///
/// The tenant's usage counters for the current month, alongside the
/// configured limits so clients can render remaining balances.
pub async fn get_quota(
    State(state): State<AppState>,
    Path(condominio_id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let config = TenantConfigRepo::get_or_default(&state.pool, condominio_id).await?;
    let usage = QuotaRepo::current(&state.pool, condominio_id, month_reference(Utc::now())).await?;

    Ok(Json(serde_json::json!({
        "data": {
            "uso": usage,
            "limites": {
                "push": config.limite_push_mensal,
                "email": config.limite_email_mensal,
                "whatsapp": config.creditos_whatsapp,
                "sms": config.creditos_sms,
                "voz_minutos": config.creditos_voz_minutos,
            }
        }
    })))
}

// ---------------------------------------------------------------------------
// User preferences
// ---------------------------------------------------------------------------

/// GET /api/v1/usuarios/{id}/preferencias
///
/// The user's channel preferences; a defaults row is created lazily.
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(usuario_id): Path<DbId>,
) -> AppResult<Json<serde_json::Value>> {
    let prefs = PreferenceRepo::get_or_default(&state.pool, usuario_id).await?;

    Ok(Json(serde_json::json!({ "data": prefs })))
}

/// PUT /api/v1/usuarios/{id}/preferencias
///
/// Partial update. Changing the WhatsApp number resets its verification
/// flag, so the channel drops out of cascades until re-verified.
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(usuario_id): Path<DbId>,
    Json(input): Json<UpdatePreference>,
) -> AppResult<Json<serde_json::Value>> {
    let prefs = PreferenceRepo::update(&state.pool, usuario_id, &input).await?;

    Ok(Json(serde_json::json!({ "data": prefs })))
}
