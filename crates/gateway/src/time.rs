//! Converts configured local-time-of-day windows into concrete UTC instants
//! for "reschedule for tomorrow's window" logic shared by check-day and
//! fill-form.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use lockbox_domain::config::TimeWindow;
use rand::Rng;

const SECONDS_PER_DAY: i64 = 86_400;

/// A uniformly random local time inside `window`. `None` means "no window
/// configured" and is treated as unrestricted (any time of day) — not as the
/// spec's literal default string "04:00:00-04:00:00", which parsed directly
/// would be the degenerate single-instant window `TimeWindow::contains` only
/// matches at that exact instant.
pub fn random_time_in_window(window: Option<TimeWindow>) -> NaiveTime {
    let mut rng = rand::thread_rng();
    let Some(window) = window else {
        let secs = rng.gen_range(0..SECONDS_PER_DAY);
        return NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0).unwrap();
    };

    let start_secs = window.start.num_seconds_from_midnight() as i64;
    let mut end_secs = window.end.num_seconds_from_midnight() as i64;
    if end_secs < start_secs {
        end_secs += SECONDS_PER_DAY;
    }
    let picked = rng.gen_range(start_secs..=end_secs) % SECONDS_PER_DAY;
    NaiveTime::from_num_seconds_from_midnight_opt(picked as u32, 0).unwrap()
}

fn local_date_time_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&date.and_time(time)).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Ambiguous/nonexistent local time around a DST transition: fall back
        // to treating the wall-clock value as already UTC rather than failing
        // a reschedule outright.
        None => Utc.from_utc_datetime(&date.and_time(time)),
    }
}

/// Tomorrow's local calendar date, at a random time inside `window`, as UTC.
pub fn tomorrow_in_window(window: Option<TimeWindow>) -> DateTime<Utc> {
    let tomorrow = Local::now().date_naive() + Duration::days(1);
    local_date_time_to_utc(tomorrow, random_time_in_window(window))
}

/// The next occurrence of `window`: today if today's window has not yet
/// finished, otherwise tomorrow.
pub fn next_window_occurrence(window: Option<TimeWindow>) -> DateTime<Utc> {
    let now = Local::now();
    let today_end = window.map(|w| w.end).unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    let date = if now.time() <= today_end { now.date_naive() } else { now.date_naive() + Duration::days(1) };
    local_date_time_to_utc(date, random_time_in_window(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_window_spans_whole_day() {
        for _ in 0..20 {
            let t = random_time_in_window(None);
            assert!(t >= NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        }
    }

    #[test]
    fn picked_time_stays_inside_window() {
        let window = TimeWindow { start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(), end: NaiveTime::from_hms_opt(9, 0, 0).unwrap() };
        for _ in 0..50 {
            let t = random_time_in_window(Some(window));
            assert!(t >= window.start && t <= window.end);
        }
    }

    #[test]
    fn picked_time_respects_midnight_wrap() {
        let window = TimeWindow { start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(), end: NaiveTime::from_hms_opt(2, 0, 0).unwrap() };
        for _ in 0..50 {
            let t = random_time_in_window(Some(window));
            assert!(t >= window.start || t <= window.end);
        }
    }
}
