//! Cascade escalation policy.
//!
//! Escalation is a strictly-ordered list of channels per tenant, never a
//! graph: an unacknowledged delivery at level N is promoted to the next
//! channel in the list after that level's timer elapses, and the chain ends
//! when the list does.

use std::time::Duration;

use crate::channel::Channel;
use crate::status::{NotificationType, Priority, CASCADE_MIN_PRIORITY};

/// Default escalation order when the tenant has not customized it.
pub const DEFAULT_CASCADE_ORDER: [Channel; 4] =
    [Channel::Push, Channel::Email, Channel::Whatsapp, Channel::Sms];

/// Wait applied at the final configured channel before the chain is marked
/// exhausted.
pub const FINAL_LEVEL_TIMER: Duration = Duration::from_secs(15 * 60);

/// Per-tenant cascade configuration, loaded once per dispatch decision.
#[derive(Debug, Clone)]
pub struct CascadePolicy {
    /// Tenant-level toggle. Emergency notifications ignore it.
    pub enabled: bool,
    /// Ordered escalation chain; escalation walks this list left to right.
    pub order: Vec<Channel>,
    /// Unacknowledged-push timer before escalating to email.
    pub push_to_email: Duration,
    /// Unacknowledged-email timer before escalating to WhatsApp.
    pub email_to_whatsapp: Duration,
    /// Unacknowledged-WhatsApp timer before escalating to SMS.
    pub whatsapp_to_sms: Duration,
}

/// What the escalation scanner should do for a chain whose current level
/// timed out without acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    /// Create a delivery on this channel at the next cascade level.
    Escalate(Channel),
    /// No further channel configured; the chain ends unacknowledged.
    Exhaust,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            order: DEFAULT_CASCADE_ORDER.to_vec(),
            push_to_email: Duration::from_secs(5 * 60),
            email_to_whatsapp: Duration::from_secs(10 * 60),
            whatsapp_to_sms: Duration::from_secs(10 * 60),
        }
    }
}

impl CascadePolicy {
    /// Whether a cascade chain should be tracked at all for a notification.
    ///
    /// Emergencies always cascade; everything else requires the tenant
    /// toggle and a priority at or above [`CASCADE_MIN_PRIORITY`].
    pub fn engages(&self, tipo: NotificationType, priority: Priority) -> bool {
        if tipo.is_emergency() {
            return true;
        }
        self.enabled && priority >= CASCADE_MIN_PRIORITY
    }

    /// How long to wait at `channel` for an acknowledgement before moving on.
    ///
    /// Channels without a configured transition timer (including the final
    /// channel of the chain) wait [`FINAL_LEVEL_TIMER`].
    pub fn wait_at(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Push => self.push_to_email,
            Channel::Email => self.email_to_whatsapp,
            Channel::Whatsapp => self.whatsapp_to_sms,
            _ => FINAL_LEVEL_TIMER,
        }
    }

    /// The next step once the timer at `current` has elapsed unacknowledged.
    ///
    /// Channels outside the configured order (a directly-selected `voz`
    /// send, for instance) have no chain to continue and exhaust.
    pub fn step_after(&self, current: Channel) -> CascadeStep {
        let pos = self.order.iter().position(|c| *c == current);
        match pos {
            Some(i) if i + 1 < self.order.len() => CascadeStep::Escalate(self.order[i + 1]),
            _ => CascadeStep::Exhaust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_policy() -> CascadePolicy {
        CascadePolicy {
            enabled: true,
            ..CascadePolicy::default()
        }
    }

    #[test]
    fn disabled_policy_does_not_engage() {
        let p = CascadePolicy::default();
        assert!(!p.engages(NotificationType::Alerta, Priority::Critica));
    }

    #[test]
    fn emergency_always_engages() {
        let p = CascadePolicy::default();
        assert!(p.engages(NotificationType::Emergencia, Priority::Normal));
    }

    #[test]
    fn routine_priority_does_not_engage() {
        let p = enabled_policy();
        assert!(!p.engages(NotificationType::Comunicado, Priority::Normal));
        assert!(!p.engages(NotificationType::Comunicado, Priority::Baixa));
    }

    #[test]
    fn high_priority_engages_when_enabled() {
        let p = enabled_policy();
        assert!(p.engages(NotificationType::Alerta, Priority::Alta));
        assert!(p.engages(NotificationType::Cobranca, Priority::Critica));
    }

    #[test]
    fn default_chain_walks_push_email_whatsapp_sms() {
        let p = enabled_policy();
        assert_eq!(p.step_after(Channel::Push), CascadeStep::Escalate(Channel::Email));
        assert_eq!(p.step_after(Channel::Email), CascadeStep::Escalate(Channel::Whatsapp));
        assert_eq!(p.step_after(Channel::Whatsapp), CascadeStep::Escalate(Channel::Sms));
        assert_eq!(p.step_after(Channel::Sms), CascadeStep::Exhaust);
    }

    #[test]
    fn channel_outside_chain_exhausts() {
        let p = enabled_policy();
        assert_eq!(p.step_after(Channel::Voz), CascadeStep::Exhaust);
        assert_eq!(p.step_after(Channel::Mural), CascadeStep::Exhaust);
    }

    #[test]
    fn truncated_chain_exhausts_at_its_end() {
        let p = CascadePolicy {
            enabled: true,
            order: vec![Channel::Push, Channel::Email, Channel::Whatsapp],
            ..CascadePolicy::default()
        };
        assert_eq!(p.step_after(Channel::Whatsapp), CascadeStep::Exhaust);
    }

    #[test]
    fn wait_uses_configured_transition_timers() {
        let p = CascadePolicy {
            enabled: true,
            push_to_email: Duration::from_secs(300),
            email_to_whatsapp: Duration::from_secs(600),
            whatsapp_to_sms: Duration::from_secs(600),
            ..CascadePolicy::default()
        };
        assert_eq!(p.wait_at(Channel::Push), Duration::from_secs(300));
        assert_eq!(p.wait_at(Channel::Email), Duration::from_secs(600));
        assert_eq!(p.wait_at(Channel::Whatsapp), Duration::from_secs(600));
        assert_eq!(p.wait_at(Channel::Sms), FINAL_LEVEL_TIMER);
    }
}
