//! Route definitions for tenant config, quota, and user preferences.

use axum::routing::get;
use axum::Router;

use crate::handlers::tenant;
use crate::state::AppState;

/// Routes mounted under `/api/v1`.
///
/// ```text
/// GET    /condominios/{id}/config        -> get_tenant_config
/// PUT    /condominios/{id}/config        -> update_tenant_config
/// GET    /condominios/{id}/cota          -> get_quota
///
/// GET    /usuarios/{id}/preferencias     -> get_preferences
/// PUT    /usuarios/{id}/preferencias     -> update_preferences
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/condominios/{id}/config",
            get(tenant::get_tenant_config).put(tenant::update_tenant_config),
        )
        .route("/condominios/{id}/cota", get(tenant::get_quota))
        .route(
            "/usuarios/{id}/preferencias",
            get(tenant::get_preferences).put(tenant::update_preferences),
        )
}
