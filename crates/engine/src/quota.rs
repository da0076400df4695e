//! Quota ledger: pre-send availability checks and post-send commits.
//!
//! Availability is a read-side check (the gate); the commit is an atomic
//! SQL increment, so a near-limit race can overshoot by at most the number
//! of concurrent workers, never lose usage. Threshold alerts piggyback on
//! the commit and fire exactly once per tenant-month via the one-way flags.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use portaria_core::channel::Channel;
use portaria_core::quota::{self, QuotaThreshold};
use portaria_core::types::DbId;
use portaria_db::models::quota::month_reference;
use portaria_db::models::tenant_config::TenantConfig;
use portaria_db::repositories::QuotaRepo;

use crate::bus::{EngineBus, EngineEvent};
use crate::error::EngineError;

/// Whether a metered channel has credit for one more send this month.
///
/// Unmetered channels always pass here; their monthly limits produce
/// alerts, not blocks. Metered channels are prepaid, so a tenant with a
/// zero credit balance is blocked outright.
pub async fn available(
    pool: &PgPool,
    tenant: &TenantConfig,
    canal: Channel,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    if !canal.is_metered() {
        return Ok(true);
    }
    let usage = QuotaRepo::current(pool, tenant.condominio_id, month_reference(now)).await?;
    Ok(quota::has_credit(
        usage.usage_for(canal),
        tenant.monthly_limit(canal),
    ))
}

/// Commit an accepted send and fire any newly crossed threshold alerts.
pub async fn commit(
    pool: &PgPool,
    bus: &EngineBus,
    tenant: &TenantConfig,
    canal: Channel,
    units: i32,
    custo_centavos: i32,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let mes = month_reference(now);
    let usage = QuotaRepo::commit_usage(
        pool,
        tenant.condominio_id,
        mes,
        canal,
        units,
        custo_centavos,
    )
    .await?;

    let limit = tenant.monthly_limit(canal);
    let due = quota::thresholds_to_fire(usage.usage_for(canal), limit, usage.fired_flags());
    for threshold in due {
        // Only the worker that flips the flag emits the alert.
        let fired =
            QuotaRepo::mark_alert_fired(pool, tenant.condominio_id, mes, threshold).await?;
        if fired {
            emit_alert(bus, tenant.condominio_id, canal, threshold, &usage_pct(&usage, canal, limit));
            tracing::warn!(
                condominio_id = tenant.condominio_id,
                canal = %canal,
                limiar = threshold.percent(),
                "Quota threshold crossed"
            );
        }
    }
    Ok(())
}

fn usage_pct(
    usage: &portaria_db::models::quota::QuotaUsage,
    canal: Channel,
    limit: i64,
) -> serde_json::Value {
    serde_json::json!({
        "uso": usage.usage_for(canal),
        "limite": limit,
        "percentual": quota::usage_percent(usage.usage_for(canal), limit),
    })
}

fn emit_alert(
    bus: &EngineBus,
    condominio_id: DbId,
    canal: Channel,
    threshold: QuotaThreshold,
    detail: &serde_json::Value,
) {
    bus.publish(
        EngineEvent::new("cota.alerta")
            .with_tenant(condominio_id)
            .with_payload(serde_json::json!({
                "canal": canal.as_str(),
                "limiar": threshold.percent(),
                "detalhe": detail,
            })),
    );
}
