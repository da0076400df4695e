//! Quota threshold arithmetic.
//!
//! Usage and cost are integers (sends, minutes, centavos). Percentage
//! comparisons use integer floor division so a threshold only fires once
//! usage has genuinely reached it.

/// Quota alert thresholds, in percent of the monthly limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaThreshold {
    Pct50,
    Pct80,
    Pct100,
}

impl QuotaThreshold {
    pub fn percent(&self) -> i64 {
        match self {
            QuotaThreshold::Pct50 => 50,
            QuotaThreshold::Pct80 => 80,
            QuotaThreshold::Pct100 => 100,
        }
    }
}

/// Floor percentage of `usage` against `limit`. A zero or negative limit
/// means unlimited and always reports 0%.
pub fn usage_percent(usage: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    usage.saturating_mul(100) / limit
}

/// Whether a prepaid balance covers one more send.
///
/// Unlike the alert limits fed to [`usage_percent`], a zero or negative
/// balance means "no credits", not "unlimited": metered channels are
/// prepaid and must never send past what the tenant bought.
pub fn has_credit(usage: i64, balance: i64) -> bool {
    balance > 0 && usage < balance
}

/// Thresholds that should fire given current usage and the one-way
/// already-fired flags `(50%, 80%, 100%)`, lowest first.
///
/// Flags are never reset mid-month, which guarantees at most one alert per
/// threshold per month even when a single burst crosses several at once.
pub fn thresholds_to_fire(
    usage: i64,
    limit: i64,
    fired: (bool, bool, bool),
) -> Vec<QuotaThreshold> {
    let pct = usage_percent(usage, limit);
    let mut due = Vec::new();
    if pct >= 50 && !fired.0 {
        due.push(QuotaThreshold::Pct50);
    }
    if pct >= 80 && !fired.1 {
        due.push(QuotaThreshold::Pct80);
    }
    if pct >= 100 && !fired.2 {
        due.push(QuotaThreshold::Pct100);
    }
    due
}
