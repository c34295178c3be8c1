//! Wake and reporting schedule arithmetic
//!
//! Pure functions over epoch seconds.  Everything here is deterministic so
//! the sleep planner and report gating can be tested exhaustively on the
//! host without a clock.

pub const SECS_PER_HOUR: u32 = 3600;
pub const SECS_PER_DAY: u64 = 86_400;

/// Seconds until the next wake boundary, strictly positive.
///
/// Wakes align to multiples of `boundary_secs` past midnight UTC plus one
/// second of slack, so a device waking exactly on the boundary lands just
/// past it and computes the following boundary rather than zero.
pub fn seconds_until_next_wake(now_epoch: u64, boundary_secs: u32) -> u32 {
    debug_assert!(boundary_secs > 0);
    let b = u64::from(boundary_secs);
    ((b - now_epoch % b) + 1) as u32
}

/// Hour of day (0-23) in UTC for an epoch timestamp.
pub fn hour_of_day(epoch: u64) -> u8 {
    ((epoch / u64::from(SECS_PER_HOUR)) % 24) as u8
}

/// Day number since the epoch, for "has the day rolled over" checks.
pub fn day_number(epoch: u64) -> u64 {
    epoch / SECS_PER_DAY
}

/// Whether the facility is open at the given hour.
///
/// `open_hour` is inclusive, `close_hour` exclusive.  Outside the open
/// window the device naps through boundaries instead of reporting.
pub fn is_facility_open(hour: u8, open_hour: u8, close_hour: u8) -> bool {
    hour >= open_hour && hour < close_hour
}

/// Whether a report is due: true when the current hour differs from the
/// hour of the last report.  Coupled with hourly wake boundaries this
/// yields at most one report per hour without storing a next-report time.
pub fn is_report_due(now_epoch: u64, last_report_epoch: u64) -> bool {
    now_epoch / u64::from(SECS_PER_HOUR) != last_report_epoch / u64::from(SECS_PER_HOUR)
}

/// Valid opening hour: midnight through noon.
pub fn is_valid_open_hour(hour: u8) -> bool {
    hour <= 12
}

/// Valid closing hour: noon through midnight (24 = closes at end of day).
pub fn is_valid_close_hour(hour: u8) -> bool {
    (12..=24).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_is_always_strictly_positive_and_bounded() {
        for now in [0u64, 1, 3599, 3600, 3601, 7199, 1_700_000_000] {
            let s = seconds_until_next_wake(now, 3600);
            assert!(s >= 2, "now={now}");
            assert!(s <= 3601, "now={now}");
        }
    }

    #[test]
    fn wake_lands_past_the_boundary() {
        // 10 seconds before an hour boundary: sleep 11s, landing 1s past it.
        assert_eq!(seconds_until_next_wake(3590, 3600), 11);
        // Exactly on a boundary: sleep through the full next period plus slack.
        assert_eq!(seconds_until_next_wake(7200, 3600), 3601);
        // One second past: the rest of the period.
        assert_eq!(seconds_until_next_wake(7201, 3600), 3600);
    }

    #[test]
    fn hour_of_day_wraps_at_midnight() {
        assert_eq!(hour_of_day(0), 0);
        assert_eq!(hour_of_day(3600), 1);
        assert_eq!(hour_of_day(23 * 3600), 23);
        assert_eq!(hour_of_day(24 * 3600), 0);
        assert_eq!(hour_of_day(24 * 3600 + 3599), 0);
    }

    #[test]
    fn facility_open_window_half_open() {
        assert!(!is_facility_open(5, 6, 22));
        assert!(is_facility_open(6, 6, 22));
        assert!(is_facility_open(21, 6, 22));
        assert!(!is_facility_open(22, 6, 22));
    }

    #[test]
    fn report_due_when_hour_differs() {
        let t = 1_700_000_000u64;
        let hour_start = t - t % 3600;
        assert!(!is_report_due(hour_start + 100, hour_start + 5));
        assert!(is_report_due(hour_start + 3600, hour_start + 3599));
        // A never-reported device (epoch 0) is always due.
        assert!(is_report_due(t, 0));
    }

    #[test]
    fn open_close_hour_validation() {
        assert!(is_valid_open_hour(0));
        assert!(is_valid_open_hour(12));
        assert!(!is_valid_open_hour(13));
        assert!(is_valid_close_hour(12));
        assert!(is_valid_close_hour(24));
        assert!(!is_valid_close_hour(11));
        assert!(!is_valid_close_hour(25));
    }

    #[test]
    fn day_number_rolls_at_midnight() {
        assert_eq!(day_number(86_399), 0);
        assert_eq!(day_number(86_400), 1);
    }

    proptest::proptest! {
        // Every wake lands exactly one guard second past a boundary that
        // lies strictly in the future.
        #[test]
        fn wake_law_for_arbitrary_now(
            now in 0u64..4_000_000_000,
            boundary in 1u32..=86_400,
        ) {
            let s = seconds_until_next_wake(now, boundary);
            proptest::prop_assert!(s >= 2);
            proptest::prop_assert!(s <= boundary + 1);
            proptest::prop_assert_eq!(
                (now + u64::from(s) - 1) % u64::from(boundary),
                0
            );
        }
    }
}
