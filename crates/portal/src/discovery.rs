//! School/day-cycle/course discovery built on top of a [`PortalSession`].
//! Grounded directly on the original `get_async_courses` routine: walk the
//! cycle in 14-day windows up to 100 days out until all four cycle days are
//! located, then pull one timetable per cycle day and keep async periods.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use lockbox_domain::{Error, Result};

use crate::{PortalSession, School, TimetableItem};

const CHECK_RANGE_DAYS: i64 = 14;
const CYCLE_LENGTH: usize = 4;
const LOOKAHEAD_DAYS: i64 = 100;

pub fn select_school(schools: &[School], school_code_filter: Option<i64>) -> Result<&School> {
    match school_code_filter {
        Some(code) => schools
            .iter()
            .find(|s| s.code == code)
            .ok_or_else(|| Error::Portal(format!("no school with code {code}"))),
        None => match schools {
            [only] => Ok(only),
            [] => Err(Error::Portal("portal returned no schools".into())),
            _ => Err(Error::Portal(format!(
                "expected exactly one school, got {} (set LOCKBOX_SCHOOL to disambiguate)",
                schools.len()
            ))),
        },
    }
}

/// The day-cycle name for `today` alone, used by check-day.
pub async fn day_name_today(session: &dyn PortalSession, school_id: &str, today: NaiveDate) -> Result<String> {
    let names = session
        .day_cycle_names(school_id, today, today + Duration::days(1))
        .await?;
    names
        .into_iter()
        .next()
        .ok_or_else(|| Error::Portal("portal returned no day-cycle name for today".into()))
}

/// Maps cycle day number (1..=4) to the date that cycle day falls on. Walks
/// forward from `today` in `CHECK_RANGE_DAYS`-day windows until all four
/// cycle days are found or `LOOKAHEAD_DAYS` is exhausted.
async fn find_cycle_day_dates(
    session: &dyn PortalSession,
    school_id: &str,
    today: NaiveDate,
) -> Result<BTreeMap<u8, NaiveDate>> {
    let mut day_offsets: BTreeMap<u8, NaiveDate> = BTreeMap::new();

    let mut i = 0i64;
    while i < LOOKAHEAD_DAYS {
        let window_start = today + Duration::days(i);
        let window_end = today + Duration::days(i + CHECK_RANGE_DAYS);
        let names = session.day_cycle_names(school_id, window_start, window_end).await?;

        for (offset, name) in names.iter().enumerate() {
            if let Some(cycle_day) = parse_cycle_day(name) {
                day_offsets.entry(cycle_day).or_insert_with(|| today + Duration::days(i + offset as i64));
                if day_offsets.len() == CYCLE_LENGTH {
                    break;
                }
            }
        }
        if day_offsets.len() == CYCLE_LENGTH {
            break;
        }
        i += CHECK_RANGE_DAYS;
    }

    Ok(day_offsets)
}

/// `"D<N>"` (exactly 2 chars) names a school day; anything else (including
/// bare `"D"`) is a non-school day.
pub fn parse_cycle_day(name: &str) -> Option<u8> {
    if name.len() != 2 {
        return None;
    }
    let mut chars = name.chars();
    if chars.next() != Some('D') {
        return None;
    }
    chars.next().and_then(|c| c.to_digit(10)).map(|d| d as u8)
}

/// For each of the four cycle days, the async (period ending in `"a"`)
/// timetable items on the date that cycle day next falls on.
pub async fn async_courses_by_cycle_day(
    session: &dyn PortalSession,
    school_id: &str,
    today: NaiveDate,
) -> Result<Vec<(u8, Vec<TimetableItem>)>> {
    let day_dates = find_cycle_day_dates(session, school_id, today).await?;
    let mut out = Vec::with_capacity(day_dates.len());
    for (cycle_day, date) in day_dates {
        let timetable = session.timetable(school_id, date).await?;
        let async_items: Vec<TimetableItem> = timetable
            .into_iter()
            .filter(|item| item.course_period.ends_with('a'))
            .collect();
        out.push((cycle_day, async_items));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_school_day_names() {
        assert_eq!(parse_cycle_day("D1"), Some(1));
        assert_eq!(parse_cycle_day("D4"), Some(4));
        assert_eq!(parse_cycle_day("D"), None);
        assert_eq!(parse_cycle_day("Dx"), None);
        assert_eq!(parse_cycle_day("D12"), None);
    }

    #[test]
    fn select_school_by_code() {
        let schools = vec![
            School { id: "a".into(), code: 1, name: "A".into() },
            School { id: "b".into(), code: 2, name: "B".into() },
        ];
        let chosen = select_school(&schools, Some(2)).unwrap();
        assert_eq!(chosen.id, "b");
    }

    #[test]
    fn select_school_requires_exactly_one_without_filter() {
        let schools = vec![
            School { id: "a".into(), code: 1, name: "A".into() },
            School { id: "b".into(), code: 2, name: "B".into() },
        ];
        assert!(select_school(&schools, None).is_err());

        let one = vec![School { id: "a".into(), code: 1, name: "A".into() }];
        assert!(select_school(&one, None).is_ok());
    }
}
