//! Cron parsing behind an injectable capability.
//!
//! The scheduler only ever asks "when is the next occurrence after T", so
//! the cron implementation can be swapped out (tests use fixed intervals).

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::ReminderError;

/// A compiled schedule
pub trait Timetable: Send + Sync {
    /// First occurrence strictly after `after`, or `None` if the schedule is exhausted
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Turns a user-supplied expression into a [`Timetable`]
pub trait ScheduleCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> Result<Arc<dyn Timetable>, ReminderError>;
}

/// [`ScheduleCompiler`] backed by the `cron` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct CronCompiler;

struct CronTimetable(cron::Schedule);

impl Timetable for CronTimetable {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.0.after(&after).next()
    }
}

/// Prepend a zero seconds field to standard five-field cron.
///
/// The `cron` crate wants `sec min hour dom month dow [year]`; users write
/// `min hour dom month dow`.
///
/// Standard cron counts weekdays 0-7 from Sunday (0 and 7 both Sunday) while
/// the crate counts 1-7 from Sunday, so the day-of-week field is rewritten
/// too. Six- and seven-field input is already in the crate's dialect and
/// passes through.
pub fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, day, month, weekday] => format!(
            "0 {minute} {hour} {day} {month} {}",
            translate_weekdays(weekday)
        ),
        _ => trimmed.to_string(),
    }
}

fn translate_weekdays(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }
    field
        .split(',')
        .map(|item| match expand_weekdays(item) {
            Some(days) => days
                .iter()
                .map(|day| (day + 1).to_string())
                .collect::<Vec<_>>()
                .join(","),
            // Names and anything unparseable go to the crate as typed
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Standard weekday numbers (0 = Sunday) selected by one list item
fn expand_weekdays(item: &str) -> Option<BTreeSet<u32>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<u32>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };

    let day = |raw: &str| raw.parse::<u32>().ok().filter(|d| *d <= 7);
    let (start, end) = match range.split_once('-') {
        _ if range == "*" => (0, 6),
        Some((start, end)) => (day(start)?, day(end)?),
        None if item.contains('/') => (day(range)?, 6),
        None => {
            let single = day(range)?;
            (single, single)
        }
    };
    if start > end {
        return None;
    }

    Some(
        (start..=end)
            .step_by(step as usize)
            .map(|d| d % 7)
            .collect(),
    )
}

impl ScheduleCompiler for CronCompiler {
    fn compile(&self, expression: &str) -> Result<Arc<dyn Timetable>, ReminderError> {
        let invalid = |reason: String| ReminderError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        let field_count = expression.split_whitespace().count();
        if !(5..=7).contains(&field_count) {
            return Err(invalid(format!(
                "expected 5 or 6 fields, found {field_count}"
            )));
        }

        let schedule =
            cron::Schedule::from_str(&normalize_cron(expression)).map_err(|e| invalid(e.to_string()))?;

        if schedule.upcoming(Utc).next().is_none() {
            return Err(invalid("schedule never fires again".to_string()));
        }

        Ok(Arc::new(CronTimetable(schedule)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// Fires every `period`, for expressions of the form `@every <millis>ms`.
    /// Anything else is handed to [`CronCompiler`].
    #[derive(Default)]
    pub struct IntervalCompiler;

    struct Interval(chrono::Duration);

    impl Timetable for Interval {
        fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
            Some(after + self.0)
        }
    }

    impl ScheduleCompiler for IntervalCompiler {
        fn compile(&self, expression: &str) -> Result<Arc<dyn Timetable>, ReminderError> {
            if let Some(millis) = expression
                .strip_prefix("@every ")
                .and_then(|rest| rest.strip_suffix("ms"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                let period = chrono::Duration::from_std(Duration::from_millis(millis))
                    .map_err(|e| ReminderError::InvalidSchedule {
                        expression: expression.to_string(),
                        reason: e.to_string(),
                    })?;
                return Ok(Arc::new(Interval(period)));
            }
            CronCompiler.compile(expression)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(normalize_cron("0 */2 * * *"), "0 0 */2 * * *");
        assert_eq!(normalize_cron("  */5 * * * *  "), "0 */5 * * * *");
    }

    #[test]
    fn test_normalize_six_fields_untouched() {
        assert_eq!(normalize_cron("0 0 */2 * * *"), "0 0 */2 * * *");
        assert_eq!(normalize_cron("0 0 9 * * 2"), "0 0 9 * * 2");
    }

    #[test]
    fn test_normalize_shifts_weekdays() {
        assert_eq!(normalize_cron("0 9 * * 0"), "0 0 9 * * 1");
        assert_eq!(normalize_cron("0 9 * * 7"), "0 0 9 * * 1");
        assert_eq!(normalize_cron("30 9 * * 1-5"), "0 30 9 * * 2,3,4,5,6");
        assert_eq!(normalize_cron("0 9 * * 5-7"), "0 0 9 * * 1,6,7");
        assert_eq!(normalize_cron("0 9 * * 1,3"), "0 0 9 * * 2,4");
        assert_eq!(normalize_cron("0 9 * * */2"), "0 0 9 * * 1,3,5,7");
        assert_eq!(normalize_cron("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
    }

    #[test]
    fn test_weekday_numbers_follow_standard_cron() {
        use chrono::{Datelike, Weekday};

        // Wednesday
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let sunday = CronCompiler.compile("0 9 * * 0").unwrap().next_after(start).unwrap();
        assert_eq!(sunday, Utc.with_ymd_and_hms(2024, 5, 5, 9, 0, 0).unwrap());
        assert_eq!(sunday.weekday(), Weekday::Sun);

        let monday = CronCompiler.compile("0 9 * * 1").unwrap().next_after(start).unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);

        let weekdays = CronCompiler.compile("30 9 * * 1-5").unwrap();
        let mut at = Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap();
        let mut fired = Vec::new();
        for _ in 0..5 {
            at = weekdays.next_after(at).unwrap();
            fired.push(at.weekday());
        }
        assert_eq!(
            fired,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        );
    }

    #[test]
    fn test_compile_valid_five_field() {
        let table = CronCompiler.compile("0 */2 * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 1, 30, 0).unwrap();
        let next = table.next_after(start).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let err = CronCompiler.compile("notacron").err().unwrap();
        assert!(matches!(err, ReminderError::InvalidSchedule { .. }));

        assert!(CronCompiler.compile("61 * * * *").is_err());
        assert!(CronCompiler.compile("").is_err());
    }

    #[test]
    fn test_compile_rejects_exhausted_schedule() {
        // Year field pinned in the past: parses, but never fires again
        let err = CronCompiler.compile("0 0 0 1 1 * 2000").err().unwrap();
        match err {
            ReminderError::InvalidSchedule { reason, .. } => {
                assert!(reason.contains("never fires"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
