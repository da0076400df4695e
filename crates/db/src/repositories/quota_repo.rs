//! Repository for the `cotas_comunicacao` monthly usage counters.
//!
//! Usage is committed with atomic SQL increments after a provider accepts
//! a message, so concurrent workers never lose updates. Threshold alert
//! flags are flipped with a conditional `UPDATE ... WHERE NOT flag`, which
//! makes each alert fire exactly once per tenant-month.

use chrono::NaiveDate;
use sqlx::PgPool;

use portaria_core::channel::Channel;
use portaria_core::quota::QuotaThreshold;
use portaria_core::types::DbId;

use crate::models::quota::QuotaUsage;

/// Column list for `cotas_comunicacao` queries.
const COLUMNS: &str = "\
    id, condominio_id, mes_referencia, uso_push, uso_email, uso_whatsapp, \
    uso_sms, uso_voz_minutos, uso_in_app, custo_whatsapp_centavos, \
    custo_sms_centavos, custo_voz_centavos, custo_total_centavos, \
    alerta_50_disparado, alerta_80_disparado, alerta_100_disparado, \
    created_at, updated_at";

/// Provides usage accounting for tenant quotas.
pub struct QuotaRepo;

impl QuotaRepo {
    /// Get the tenant's row for a month, creating it lazily.
    ///
    /// `INSERT ... ON CONFLICT DO NOTHING` followed by a plain `SELECT`
    /// keeps this safe under concurrent first-use of a month.
    pub async fn current(
        pool: &PgPool,
        condominio_id: DbId,
        mes_referencia: NaiveDate,
    ) -> Result<QuotaUsage, sqlx::Error> {
        sqlx::query(
            "INSERT INTO cotas_comunicacao (condominio_id, mes_referencia) \
             VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT uq_cota_mes DO NOTHING",
        )
        .bind(condominio_id)
        .bind(mes_referencia)
        .execute(pool)
        .await?;

        let query = format!(
            "SELECT {COLUMNS} FROM cotas_comunicacao \
             WHERE condominio_id = $1 AND mes_referencia = $2"
        );
        sqlx::query_as::<_, QuotaUsage>(&query)
            .bind(condominio_id)
            .bind(mes_referencia)
            .fetch_one(pool)
            .await
    }

    /// Commit one accepted send against the month's counters.
    ///
    /// `units` is 1 for message channels and the call duration in minutes
    /// for voice. Returns the updated row.
    pub async fn commit_usage(
        pool: &PgPool,
        condominio_id: DbId,
        mes_referencia: NaiveDate,
        canal: Channel,
        units: i32,
        custo_centavos: i32,
    ) -> Result<QuotaUsage, sqlx::Error> {
        let (usage_column, cost_column) = match canal {
            Channel::Push => ("uso_push", None),
            Channel::Email => ("uso_email", None),
            Channel::Whatsapp => ("uso_whatsapp", Some("custo_whatsapp_centavos")),
            Channel::Sms => ("uso_sms", Some("custo_sms_centavos")),
            Channel::Voz => ("uso_voz_minutos", Some("custo_voz_centavos")),
            Channel::InApp | Channel::Mural => ("uso_in_app", None),
        };

        let cost_sets = match cost_column {
            Some(col) => format!(
                ", {col} = {col} + $4, custo_total_centavos = custo_total_centavos + $4"
            ),
            None => String::new(),
        };
        let query = format!(
            "UPDATE cotas_comunicacao \
             SET {usage_column} = {usage_column} + $3{cost_sets}, updated_at = NOW() \
             WHERE condominio_id = $1 AND mes_referencia = $2 \
             RETURNING {COLUMNS}"
        );

        let mut q = sqlx::query_as::<_, QuotaUsage>(&query)
            .bind(condominio_id)
            .bind(mes_referencia)
            .bind(units);
        if cost_column.is_some() {
            q = q.bind(custo_centavos);
        }
        q.fetch_one(pool).await
    }

    /// Flip one alert flag if it has not fired yet.
    ///
    /// Returns `true` only for the call that actually flipped it, so the
    /// caller emits each threshold alert once per tenant-month.
    pub async fn mark_alert_fired(
        pool: &PgPool,
        condominio_id: DbId,
        mes_referencia: NaiveDate,
        threshold: QuotaThreshold,
    ) -> Result<bool, sqlx::Error> {
        let flag = match threshold {
            QuotaThreshold::Pct50 => "alerta_50_disparado",
            QuotaThreshold::Pct80 => "alerta_80_disparado",
            QuotaThreshold::Pct100 => "alerta_100_disparado",
        };
        let query = format!(
            "UPDATE cotas_comunicacao \
             SET {flag} = TRUE, updated_at = NOW() \
             WHERE condominio_id = $1 AND mes_referencia = $2 AND NOT {flag}"
        );
        let result = sqlx::query(&query)
            .bind(condominio_id)
            .bind(mes_referencia)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
