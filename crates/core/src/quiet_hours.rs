//! Tenant quiet-hours window.
//!
//! A window is a daily `[start, end)` interval of local wall-clock time.
//! Windows may wrap past midnight (e.g. 22:00 → 07:00), which is the common
//! configuration.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};

/// A daily quiet window during which non-emergency sends are deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `now` falls inside the quiet window.
    ///
    /// A degenerate window with `start == end` is treated as disabled.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if self.start == self.end {
            return false;
        }
        let t = now.time();
        if self.start < self.end {
            // Same-day window, e.g. 13:00 → 15:00.
            t >= self.start && t < self.end
        } else {
            // Overnight window, e.g. 22:00 → 07:00.
            t >= self.start || t < self.end
        }
    }

    /// The next instant at which the quiet window ends, given that `now`
    /// is inside it. Deferred deliveries are rescheduled to this time.
    pub fn next_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        debug_assert!(self.contains(now));
        let today_end = now
            .date_naive()
            .and_time(self.end)
            .and_utc();
        if today_end > now {
            today_end
        } else {
            today_end + ChronoDuration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn same_day_window() {
        let w = QuietWindow::new(t(13, 0), t(15, 0));
        assert!(!w.contains(at(12, 59)));
        assert!(w.contains(at(13, 0)));
        assert!(w.contains(at(14, 30)));
        assert!(!w.contains(at(15, 0)));
    }

    #[test]
    fn overnight_window() {
        let w = QuietWindow::new(t(22, 0), t(7, 0));
        assert!(w.contains(at(23, 30)));
        assert!(w.contains(at(3, 0)));
        assert!(w.contains(at(6, 59)));
        assert!(!w.contains(at(7, 0)));
        assert!(!w.contains(at(12, 0)));
        assert!(w.contains(at(22, 0)));
    }

    #[test]
    fn degenerate_window_is_disabled() {
        let w = QuietWindow::new(t(8, 0), t(8, 0));
        assert!(!w.contains(at(8, 0)));
        assert!(!w.contains(at(20, 0)));
    }

    #[test]
    fn next_end_same_day() {
        let w = QuietWindow::new(t(13, 0), t(15, 0));
        assert_eq!(w.next_end(at(14, 0)), at(15, 0));
    }

    #[test]
    fn next_end_overnight_before_midnight() {
        let w = QuietWindow::new(t(22, 0), t(7, 0));
        let end = w.next_end(at(23, 0));
        assert_eq!(end.time(), t(7, 0));
        assert_eq!(end.date_naive(), at(23, 0).date_naive().succ_opt().unwrap());
    }

    #[test]
    fn next_end_overnight_after_midnight() {
        let w = QuietWindow::new(t(22, 0), t(7, 0));
        assert_eq!(w.next_end(at(3, 0)), at(7, 0));
    }
}
