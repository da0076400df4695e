//! Notification channel enumeration.
//!
//! The string values match the `canal_notificacao` database enum and are the
//! only representation that crosses the persistence boundary.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A delivery channel, from least to most intrusive (roughly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Email,
    Whatsapp,
    Sms,
    Voz,
    InApp,
    Mural,
}

/// All channels, in ranking order used when a recipient has several enabled:
/// cheaper and less intrusive first.
pub const ALL_CHANNELS: [Channel; 7] = [
    Channel::InApp,
    Channel::Push,
    Channel::Email,
    Channel::Whatsapp,
    Channel::Sms,
    Channel::Voz,
    Channel::Mural,
];

impl Channel {
    /// The database string value for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Voz => "voz",
            Channel::InApp => "in_app",
            Channel::Mural => "mural",
        }
    }

    /// Parse a database string value into a channel.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "push" => Ok(Channel::Push),
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            "sms" => Ok(Channel::Sms),
            "voz" => Ok(Channel::Voz),
            "in_app" => Ok(Channel::InApp),
            "mural" => Ok(Channel::Mural),
            other => Err(CoreError::Validation(format!(
                "Unknown notification channel: {other}"
            ))),
        }
    }

    /// Whether sends on this channel consume tenant credits.
    ///
    /// Metered channels are gated by the quota ledger before every send;
    /// push and email have monthly limits but no per-send cost.
    pub fn is_metered(&self) -> bool {
        matches!(self, Channel::Whatsapp | Channel::Sms | Channel::Voz)
    }

    /// Whether this channel is delivered by an external provider call.
    ///
    /// `in_app` and `mural` deliveries are materialized entirely inside our
    /// own storage and cannot fail transiently.
    pub fn is_external(&self) -> bool {
        !matches!(self, Channel::InApp | Channel::Mural)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_channel() {
        for channel in ALL_CHANNELS {
            assert_eq!(Channel::parse(channel.as_str()).unwrap(), channel);
        }
    }

    #[test]
    fn unknown_channel_rejected() {
        assert!(Channel::parse("pombo-correio").is_err());
    }

    #[test]
    fn metered_channels() {
        assert!(Channel::Sms.is_metered());
        assert!(Channel::Whatsapp.is_metered());
        assert!(Channel::Voz.is_metered());
        assert!(!Channel::Push.is_metered());
        assert!(!Channel::Email.is_metered());
        assert!(!Channel::InApp.is_metered());
    }

    #[test]
    fn internal_channels_never_call_providers() {
        assert!(!Channel::InApp.is_external());
        assert!(!Channel::Mural.is_external());
        assert!(Channel::Push.is_external());
    }
}
