use crate::model::Frequency;
use time::{Date, Duration, Month, OffsetDateTime};

const MINUTE_MS: i128 = 60_000;
const HOUR_MS: i128 = 60 * MINUTE_MS;
const DAY_MS: i128 = 24 * HOUR_MS;
const WEEK_MS: i128 = 7 * DAY_MS;
// 30.4375 and 365.25 days.
const MONTH_MS: i128 = 2_629_800_000;
const YEAR_MS: i128 = 31_557_600_000;

impl Frequency {
    /// Fixed-length bucket used to count elapsed cycles.
    pub fn bucket_millis(self) -> i128 {
        match self {
            Self::Minutely => MINUTE_MS,
            Self::Hourly => HOUR_MS,
            Self::Daily => DAY_MS,
            Self::Weekly => WEEK_MS,
            Self::Monthly => MONTH_MS,
            Self::Yearly => YEAR_MS,
        }
    }
}

/// Moves `current` forward by `interval` calendar units of `frequency`.
///
/// Month and year steps move the calendar month and clamp the day to the
/// length of the target month (Jan 31 + 1 month = Feb 28/29). An interval of
/// zero steps by one unit.
pub fn advance_due_date(
    current: OffsetDateTime,
    frequency: Frequency,
    interval: u32,
) -> OffsetDateTime {
    let steps = interval.max(1);
    let next = match frequency {
        Frequency::Minutely => current.checked_add(Duration::minutes(i64::from(steps))),
        Frequency::Hourly => current.checked_add(Duration::hours(i64::from(steps))),
        Frequency::Daily => current.checked_add(Duration::days(i64::from(steps))),
        Frequency::Weekly => current.checked_add(Duration::weeks(i64::from(steps))),
        Frequency::Monthly => add_months(current, i64::from(steps)),
        Frequency::Yearly => add_months(current, i64::from(steps) * 12),
    };

    next.unwrap_or_else(|| fallback_step(current, frequency, steps))
}

/// Whole cycles between `start` and `end`, using the fixed buckets of
/// [`Frequency::bucket_millis`]. Zero when `end` is not after `start`.
pub fn count_elapsed_cycles(
    start: OffsetDateTime,
    end: OffsetDateTime,
    frequency: Frequency,
    interval: u32,
) -> u64 {
    let elapsed_ms = (end - start).whole_milliseconds();
    if elapsed_ms <= 0 {
        return 0;
    }
    let cycle_ms = frequency.bucket_millis() * i128::from(interval.max(1));
    u64::try_from(elapsed_ms / cycle_ms).unwrap_or(u64::MAX)
}

fn add_months(current: OffsetDateTime, months: i64) -> Option<OffsetDateTime> {
    let date = current.date();
    let month_index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + months;
    let year = i32::try_from(month_index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(month_index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(time::util::days_in_year_month(year, month));
    let target = Date::from_calendar_date(year, month, day).ok()?;
    Some(current.replace_date(target))
}

// Only reached at the edge of the representable calendar.
fn fallback_step(current: OffsetDateTime, frequency: Frequency, steps: u32) -> OffsetDateTime {
    let step_ms = frequency.bucket_millis() * i128::from(steps);
    let step = Duration::milliseconds(i64::try_from(step_ms).unwrap_or(i64::MAX));
    current.checked_add(step).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::{advance_due_date, count_elapsed_cycles};
    use crate::model::Frequency;
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn advance_steps_fixed_units() {
        let start = datetime!(2025-03-10 08:15 UTC);
        assert_eq!(
            advance_due_date(start, Frequency::Minutely, 5),
            datetime!(2025-03-10 08:20 UTC)
        );
        assert_eq!(
            advance_due_date(start, Frequency::Hourly, 3),
            datetime!(2025-03-10 11:15 UTC)
        );
        assert_eq!(
            advance_due_date(start, Frequency::Daily, 2),
            datetime!(2025-03-12 08:15 UTC)
        );
        assert_eq!(
            advance_due_date(start, Frequency::Weekly, 1),
            datetime!(2025-03-17 08:15 UTC)
        );
    }

    #[test]
    fn advance_months_rolls_over_year_and_clamps_day() {
        assert_eq!(
            advance_due_date(datetime!(2025-11-15 09:00 UTC), Frequency::Monthly, 3),
            datetime!(2026-02-15 09:00 UTC)
        );
        assert_eq!(
            advance_due_date(datetime!(2025-01-31 09:00 UTC), Frequency::Monthly, 1),
            datetime!(2025-02-28 09:00 UTC)
        );
        assert_eq!(
            advance_due_date(datetime!(2024-02-29 09:00 UTC), Frequency::Yearly, 1),
            datetime!(2025-02-28 09:00 UTC)
        );
    }

    #[test]
    fn advance_keeps_offset() {
        let start = datetime!(2025-06-01 22:00 +9);
        let next = advance_due_date(start, Frequency::Daily, 1);
        assert_eq!(next, datetime!(2025-06-02 22:00 +9));
        assert_eq!(next.offset(), start.offset());
    }

    #[test]
    fn advance_is_strictly_monotonic() {
        let start = datetime!(2025-06-01 00:00 UTC);
        for frequency in [
            Frequency::Minutely,
            Frequency::Hourly,
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
            Frequency::Yearly,
        ] {
            for interval in [0, 1, 2, 13] {
                assert!(advance_due_date(start, frequency, interval) > start);
            }
        }
    }

    #[test]
    fn elapsed_cycles_floor_by_interval() {
        let start = datetime!(2025-01-01 00:00 UTC);
        let end = start + Duration::hours(60);
        assert_eq!(count_elapsed_cycles(start, end, Frequency::Daily, 1), 2);
        assert_eq!(count_elapsed_cycles(start, end, Frequency::Daily, 2), 1);
        assert_eq!(count_elapsed_cycles(start, end, Frequency::Hourly, 7), 8);
        assert_eq!(count_elapsed_cycles(start, end, Frequency::Weekly, 1), 0);
    }

    #[test]
    fn elapsed_cycles_use_average_month_and_year() {
        let start = datetime!(2025-01-01 00:00 UTC);
        // 30.4375 days is exactly one bucket.
        let one_month = start + Duration::minutes(43_830);
        assert_eq!(count_elapsed_cycles(start, one_month, Frequency::Monthly, 1), 1);
        assert_eq!(
            count_elapsed_cycles(start, one_month - Duration::seconds(1), Frequency::Monthly, 1),
            0
        );
        let year_end = start + Duration::hours(8_766);
        assert_eq!(count_elapsed_cycles(start, year_end, Frequency::Yearly, 1), 1);
    }

    #[test]
    fn elapsed_cycles_clamp_negative_spans() {
        let start = datetime!(2025-01-10 00:00 UTC);
        let earlier = datetime!(2025-01-01 00:00 UTC);
        assert_eq!(count_elapsed_cycles(start, earlier, Frequency::Daily, 1), 0);
        assert_eq!(count_elapsed_cycles(start, start, Frequency::Minutely, 1), 0);
    }
}
