use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, TimeZone};

/// The first instant strictly after `now` whose local time of day is `at`.
///
/// If `at` falls in a DST gap on some day, that day's fire moves to the
/// first valid instant an hour later. An ambiguous local time (DST fold)
/// fires on its earlier occurrence.
pub fn next_fire_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..=2)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| resolve_local(&tz, day.and_time(at)))
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).unwrap()
    }

    #[test]
    fn before_fire_time_fires_today() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 6, 59, 0).unwrap();
        assert_eq!(
            next_fire_after(&now, seven()),
            Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn exactly_at_fire_time_waits_a_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap();
        assert_eq!(
            next_fire_after(&now, seven()),
            Utc.with_ymd_and_hms(2026, 10, 20, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn after_fire_time_fires_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 18, 45, 0).unwrap();
        assert_eq!(
            next_fire_after(&now, seven()),
            Utc.with_ymd_and_hms(2027, 1, 1, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn fire_time_is_local_to_the_zone() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = ist.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).unwrap();
        let next = next_fire_after(&now, seven());
        assert_eq!(next, ist.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap());
        assert_eq!(
            next.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2026, 10, 19, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn consecutive_fires_are_a_day_apart() {
        let at = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap();
        let first = next_fire_after(&start, at);
        let second = next_fire_after(&first, at);
        assert_eq!(second - first, chrono::Duration::days(1));
        assert_eq!(second, Utc.with_ymd_and_hms(2026, 2, 28, 23, 30, 0).unwrap());
    }
}
