//! Period-boundary arithmetic for the polling loop and backfill
//!
//! All boundaries are multiples of the period length since the unix epoch.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::models::CandlePeriod;

/// Time elapsed since the start of the period containing `now`
fn into_period(now: DateTime<Utc>, period: CandlePeriod) -> ChronoDuration {
    ChronoDuration::seconds(now.timestamp().rem_euclid(period.seconds()))
        + ChronoDuration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

/// Start of the period containing `now`, truncated to whole seconds
pub fn period_start(now: DateTime<Utc>, period: CandlePeriod) -> DateTime<Utc> {
    now - into_period(now, period)
}

/// Start of the period that has just completed: the first live fetch window
pub fn initial_since(now: DateTime<Utc>, period: CandlePeriod) -> DateTime<Utc> {
    period_start(now, period) - ChronoDuration::seconds(period.seconds())
}

/// Time to sleep from `now` until the next period boundary, plus `settle`
///
/// Computed from the wall clock on every call, so a slow iteration shortens
/// the next sleep instead of pushing every later window back.
pub fn delay_until_next_boundary(
    now: DateTime<Utc>,
    period: CandlePeriod,
    settle: Duration,
) -> Duration {
    let remaining = ChronoDuration::seconds(period.seconds()) - into_period(now, period);
    remaining.to_std().unwrap_or_default() + settle
}

/// Historical window `[since, until)` replayed before live trading
///
/// Ends at the most recently closed boundary and spans `lookback` periods.
pub fn backfill_window(
    now: DateTime<Utc>,
    period: CandlePeriod,
    lookback: usize,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let until = period_start(now, period);
    let since = until - ChronoDuration::seconds(period.seconds() * lookback as i64);
    (since, until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PERIODS: [CandlePeriod; 6] = [
        CandlePeriod::OneMinute,
        CandlePeriod::FiveMinutes,
        CandlePeriod::FifteenMinutes,
        CandlePeriod::ThirtyMinutes,
        CandlePeriod::OneHour,
        CandlePeriod::FourHours,
    ];

    fn sample_instants() -> Vec<DateTime<Utc>> {
        vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 9, 13, 37, 42).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap()
                + ChronoDuration::milliseconds(999),
            Utc.with_ymd_and_hms(2025, 2, 14, 7, 4, 1).unwrap() + ChronoDuration::milliseconds(250),
            // Sub-millisecond part, as `Utc::now()` usually has
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap() + ChronoDuration::nanoseconds(400_123),
        ]
    }

    fn nanos_into_period(t: DateTime<Utc>, period: CandlePeriod) -> i64 {
        t.timestamp_nanos_opt().unwrap() % (period.seconds() * 1_000_000_000)
    }

    #[test]
    fn test_period_start_is_aligned_and_not_after_now() {
        for period in PERIODS {
            for now in sample_instants() {
                let start = period_start(now, period);
                assert_eq!(nanos_into_period(start, period), 0);
                assert!(start <= now);
                assert!(now - start < ChronoDuration::seconds(period.seconds()));
            }
        }
    }

    #[test]
    fn test_delay_lands_on_boundary() {
        for period in PERIODS {
            for now in sample_instants() {
                let delay = delay_until_next_boundary(now, period, Duration::ZERO);
                let wake = now + ChronoDuration::from_std(delay).unwrap();

                assert_eq!(nanos_into_period(wake, period), 0);
                assert!(delay > Duration::ZERO);
                assert!(delay <= Duration::from_secs(period.seconds() as u64));
            }
        }
    }

    #[test]
    fn test_delay_at_exact_boundary_waits_full_period() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap();
        let delay = delay_until_next_boundary(now, CandlePeriod::FifteenMinutes, Duration::ZERO);
        assert_eq!(delay, Duration::from_secs(900));
    }

    #[test]
    fn test_settle_delay_is_added() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 14, 30).unwrap();
        let delay =
            delay_until_next_boundary(now, CandlePeriod::FiveMinutes, Duration::from_secs(5));
        assert_eq!(delay, Duration::from_secs(35));
    }

    #[test]
    fn test_sub_millisecond_now_truncates_to_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap() + ChronoDuration::nanoseconds(400_000);
        let boundary = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap();

        assert_eq!(period_start(now, CandlePeriod::FiveMinutes), boundary);
        assert_eq!(
            initial_since(now, CandlePeriod::FiveMinutes),
            boundary - ChronoDuration::minutes(5)
        );
        assert_eq!(
            delay_until_next_boundary(now, CandlePeriod::FiveMinutes, Duration::ZERO),
            Duration::from_secs(150) - Duration::from_nanos(400_000)
        );
    }

    #[test]
    fn test_initial_since_is_last_completed_period() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 17, 12).unwrap();
        assert_eq!(
            initial_since(now, CandlePeriod::FiveMinutes),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap()
        );
    }

    #[test]
    fn test_backfill_window_size_and_end() {
        for period in PERIODS {
            for now in sample_instants() {
                let (since, until) = backfill_window(now, period, 20);
                assert_eq!(until, period_start(now, period));
                assert_eq!(nanos_into_period(since, period), 0);
                assert_eq!(nanos_into_period(until, period), 0);
                assert_eq!((until - since).num_seconds(), 20 * period.seconds());
            }
        }
    }
}
