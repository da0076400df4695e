//! Monthly quota usage model.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use sqlx::FromRow;

use portaria_core::channel::Channel;
use portaria_core::types::{DbId, Timestamp};

/// A row from the `cotas_comunicacao` table: one tenant-month of usage and
/// cost counters. Rows from prior months are never mutated after month-end;
/// the alert flags are one-way.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuotaUsage {
    pub id: DbId,
    pub condominio_id: DbId,
    pub mes_referencia: NaiveDate,
    pub uso_push: i32,
    pub uso_email: i32,
    pub uso_whatsapp: i32,
    pub uso_sms: i32,
    pub uso_voz_minutos: i32,
    pub uso_in_app: i32,
    pub custo_whatsapp_centavos: i32,
    pub custo_sms_centavos: i32,
    pub custo_voz_centavos: i32,
    pub custo_total_centavos: i32,
    pub alerta_50_disparado: bool,
    pub alerta_80_disparado: bool,
    pub alerta_100_disparado: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl QuotaUsage {
    /// Current usage counter for a channel.
    pub fn usage_for(&self, canal: Channel) -> i64 {
        match canal {
            Channel::Push => i64::from(self.uso_push),
            Channel::Email => i64::from(self.uso_email),
            Channel::Whatsapp => i64::from(self.uso_whatsapp),
            Channel::Sms => i64::from(self.uso_sms),
            Channel::Voz => i64::from(self.uso_voz_minutos),
            Channel::InApp | Channel::Mural => i64::from(self.uso_in_app),
        }
    }

    /// The one-way alert flags as `(50%, 80%, 100%)`.
    pub fn fired_flags(&self) -> (bool, bool, bool) {
        (
            self.alerta_50_disparado,
            self.alerta_80_disparado,
            self.alerta_100_disparado,
        )
    }
}

/// The `mes_referencia` value (first day of month) for a given instant.
pub fn month_reference(now: portaria_core::types::Timestamp) -> NaiveDate {
    let date = now.date_naive();
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_reference_is_first_of_month() {
        let now = chrono::Utc.with_ymd_and_hms(2025, 7, 23, 15, 0, 0).unwrap();
        assert_eq!(
            month_reference(now),
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
        );
    }
}
