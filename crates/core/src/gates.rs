//! Pre-send gate checks.
//!
//! Run by the dispatcher after claiming a delivery and before invoking the
//! channel provider. Each gate can short-circuit the attempt without a
//! provider call; the order is fixed: cancellation, quiet hours, quota.

use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::quiet_hours::QuietWindow;
use crate::status::NotificationType;

/// Quiet-hours portion of the tenant policy, as seen by one gate decision.
#[derive(Debug, Clone, Copy)]
pub struct QuietHoursGate {
    /// Tenant-level "respect quiet hours" toggle.
    pub respected: bool,
    /// The daily quiet window.
    pub window: QuietWindow,
    /// Whether emergencies may send inside the window.
    pub emergency_bypass: bool,
}

/// Outcome of the gate checks for one claimed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// All gates passed; invoke the provider.
    Proceed,
    /// The notification was cancelled; mark the delivery `cancelado`.
    Cancelled,
    /// Inside quiet hours; reschedule to the window end.
    Deferred(DateTime<Utc>),
    /// Metered channel without quota; terminal `falhou` with
    /// reason `quota_exceeded`, no retry.
    QuotaExceeded,
}

/// Evaluate the gate chain for one delivery.
///
/// `quota_available` is only consulted for metered channels and is resolved
/// by the caller against the quota ledger before evaluation.
pub fn evaluate(
    now: DateTime<Utc>,
    notification_cancelled: bool,
    tipo: NotificationType,
    channel: Channel,
    quiet: &QuietHoursGate,
    quota_available: bool,
) -> GateDecision {
    if notification_cancelled {
        return GateDecision::Cancelled;
    }

    if quiet.respected && quiet.window.contains(now) {
        let bypass = tipo.is_emergency() && quiet.emergency_bypass;
        if !bypass {
            return GateDecision::Deferred(quiet.window.next_end(now));
        }
    }

    if channel.is_metered() && !quota_available {
        return GateDecision::QuotaExceeded;
    }

    GateDecision::Proceed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, 0, 0).unwrap()
    }

    fn quiet(respected: bool, bypass: bool) -> QuietHoursGate {
        QuietHoursGate {
            respected,
            window: QuietWindow::new(
                NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            ),
            emergency_bypass: bypass,
        }
    }

    #[test]
    fn cancellation_wins_over_everything() {
        let d = evaluate(
            at(23),
            true,
            NotificationType::Emergencia,
            Channel::Sms,
            &quiet(true, true),
            false,
        );
        assert_eq!(d, GateDecision::Cancelled);
    }

    #[test]
    fn quiet_hours_defer_regular_sends() {
        let d = evaluate(
            at(23),
            false,
            NotificationType::Comunicado,
            Channel::Push,
            &quiet(true, true),
            true,
        );
        match d {
            GateDecision::Deferred(until) => {
                assert_eq!(until.time(), NaiveTime::from_hms_opt(7, 0, 0).unwrap());
            }
            other => panic!("expected Deferred, got {other:?}"),
        }
    }

    #[test]
    fn emergency_bypasses_quiet_hours_when_allowed() {
        let d = evaluate(
            at(23),
            false,
            NotificationType::Emergencia,
            Channel::Push,
            &quiet(true, true),
            true,
        );
        assert_eq!(d, GateDecision::Proceed);
    }

    #[test]
    fn emergency_still_deferred_without_bypass() {
        let d = evaluate(
            at(23),
            false,
            NotificationType::Emergencia,
            Channel::Push,
            &quiet(true, false),
            true,
        );
        assert!(matches!(d, GateDecision::Deferred(_)));
    }

    #[test]
    fn unrespected_window_never_defers() {
        let d = evaluate(
            at(23),
            false,
            NotificationType::Comunicado,
            Channel::Push,
            &quiet(false, false),
            true,
        );
        assert_eq!(d, GateDecision::Proceed);
    }

    #[test]
    fn metered_channel_without_quota_fails_terminally() {
        let d = evaluate(
            at(12),
            false,
            NotificationType::Cobranca,
            Channel::Sms,
            &quiet(true, false),
            false,
        );
        assert_eq!(d, GateDecision::QuotaExceeded);
    }

    #[test]
    fn unmetered_channel_ignores_quota_flag() {
        let d = evaluate(
            at(12),
            false,
            NotificationType::Cobranca,
            Channel::Email,
            &quiet(true, false),
            false,
        );
        assert_eq!(d, GateDecision::Proceed);
    }

    #[test]
    fn quiet_hours_checked_before_quota() {
        let d = evaluate(
            at(23),
            false,
            NotificationType::Cobranca,
            Channel::Sms,
            &quiet(true, false),
            false,
        );
        assert!(matches!(d, GateDecision::Deferred(_)));
    }
}
