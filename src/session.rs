//! Exchange session calendar
//!
//! All session arithmetic happens in exchange-local time derived from a fixed
//! UTC offset. Trading days are keyed by the local calendar date.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::config::SessionConfig;

/// Converts wall-clock instants into session-relative quantities
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
    exit_window: Duration,
}

impl SessionClock {
    /// Create a session clock from configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        let offset =
            FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            open: config.open_time,
            close: config.close_time,
            exit_window: Duration::minutes(config.exit_window_minutes.max(0)),
        }
    }

    /// Exchange-local view of an instant
    pub fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    /// Trading day (exchange-local date) containing `now`
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date_naive()
    }

    /// UTC instant of local midnight at the start of `now`'s trading day
    pub fn day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = self.trading_day(now).and_time(NaiveTime::MIN);
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// Time remaining until today's close; negative once the close has passed
    pub fn time_to_close(&self, now: DateTime<Utc>) -> Duration {
        let local = self.local(now);
        let close = local.date_naive().and_time(self.close);
        close - local.naive_local()
    }

    /// True once `now` is within the forced-exit window before close, or past it
    pub fn in_exit_window(&self, now: DateTime<Utc>) -> bool {
        let local_time = self.local(now).time();
        local_time >= self.open && self.time_to_close(now) <= self.exit_window
    }

    /// True between open and close
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local_time = self.local(now).time();
        local_time >= self.open && local_time < self.close
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist(h: u32, m: u32) -> DateTime<Utc> {
        // 2026-10-16 in IST; IST = UTC + 5:30
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 16, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_trading_day_uses_local_date() {
        let clock = SessionClock::default();
        // 00:30 IST is still the previous UTC day
        let now = ist(0, 30);
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        assert_eq!(
            clock.trading_day(now),
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
        );
        assert_eq!(clock.day_start(now), ist(0, 0));
    }

    #[test]
    fn test_exit_window() {
        let clock = SessionClock::default();
        assert!(!clock.in_exit_window(ist(10, 0)));
        assert!(!clock.in_exit_window(ist(15, 14)));
        assert!(clock.in_exit_window(ist(15, 15)));
        assert!(clock.in_exit_window(ist(15, 45)));
        // Before the open nothing is forced
        assert!(!clock.in_exit_window(ist(8, 0)));
    }

    #[test]
    fn test_time_to_close() {
        let clock = SessionClock::default();
        assert_eq!(clock.time_to_close(ist(15, 0)), Duration::minutes(30));
        assert_eq!(clock.time_to_close(ist(16, 0)), Duration::minutes(-30));
    }

    #[test]
    fn test_is_open() {
        let clock = SessionClock::default();
        assert!(clock.is_open(ist(9, 15)));
        assert!(!clock.is_open(ist(15, 30)));
    }
}
