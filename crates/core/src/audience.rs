//! Audience filters for notification targeting.
//!
//! A filter is stored on the notification row as a `destinatarios_tipo`
//! discriminator plus a JSON `destinatarios_filtro` payload, and resolved
//! into concrete recipients by the engine's recipient resolver.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Which residents a notification targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "filtro", rename_all = "snake_case")]
pub enum AudienceFilter {
    /// Every active resident of the tenant.
    Todos,
    /// Residents of the given blocks.
    Bloco(Vec<DbId>),
    /// Users holding any of the given roles (e.g. `sindico`, `conselho`).
    Role(Vec<String>),
}

impl AudienceFilter {
    /// The `destinatarios_tipo` discriminator stored on the notification row.
    pub fn kind(&self) -> &'static str {
        match self {
            AudienceFilter::Todos => "todos",
            AudienceFilter::Bloco(_) => "bloco",
            AudienceFilter::Role(_) => "role",
        }
    }

    /// The JSON `destinatarios_filtro` payload, `null` for `todos`.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            AudienceFilter::Todos => serde_json::Value::Null,
            AudienceFilter::Bloco(ids) => serde_json::json!(ids),
            AudienceFilter::Role(roles) => serde_json::json!(roles),
        }
    }

    /// Reconstruct a filter from its stored discriminator and payload.
    pub fn from_row(kind: &str, payload: &serde_json::Value) -> Result<Self, CoreError> {
        match kind {
            "todos" => Ok(AudienceFilter::Todos),
            "bloco" => {
                let ids: Vec<DbId> = serde_json::from_value(payload.clone()).map_err(|e| {
                    CoreError::Validation(format!("Invalid bloco filter payload: {e}"))
                })?;
                Ok(AudienceFilter::Bloco(ids))
            }
            "role" => {
                let roles: Vec<String> = serde_json::from_value(payload.clone()).map_err(|e| {
                    CoreError::Validation(format!("Invalid role filter payload: {e}"))
                })?;
                Ok(AudienceFilter::Role(roles))
            }
            other => Err(CoreError::Validation(format!(
                "Unknown audience filter kind: {other}"
            ))),
        }
    }

    /// Validate that a non-`todos` filter actually names something.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            AudienceFilter::Todos => Ok(()),
            AudienceFilter::Bloco(ids) if ids.is_empty() => Err(CoreError::Validation(
                "Bloco audience filter must name at least one block".to_string(),
            )),
            AudienceFilter::Role(roles) if roles.is_empty() => Err(CoreError::Validation(
                "Role audience filter must name at least one role".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todos_round_trip() {
        let filter = AudienceFilter::Todos;
        let rebuilt = AudienceFilter::from_row(filter.kind(), &filter.payload()).unwrap();
        assert_eq!(rebuilt, filter);
    }

    #[test]
    fn bloco_round_trip() {
        let filter = AudienceFilter::Bloco(vec![3, 7]);
        let rebuilt = AudienceFilter::from_row(filter.kind(), &filter.payload()).unwrap();
        assert_eq!(rebuilt, filter);
    }

    #[test]
    fn role_round_trip() {
        let filter = AudienceFilter::Role(vec!["sindico".to_string()]);
        let rebuilt = AudienceFilter::from_row(filter.kind(), &filter.payload()).unwrap();
        assert_eq!(rebuilt, filter);
    }

    #[test]
    fn empty_bloco_filter_rejected() {
        assert!(AudienceFilter::Bloco(vec![]).validate().is_err());
    }

    #[test]
    fn empty_role_filter_rejected() {
        assert!(AudienceFilter::Role(vec![]).validate().is_err());
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(AudienceFilter::from_row("predio", &serde_json::Value::Null).is_err());
    }
}
