//! Calendar-day arithmetic and date-range selection over scheduled tasks.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::model::Task;

/// Where a date-range query is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeSource {
    /// Filter the resident task list.
    Cache,
    /// Ask the gateway.
    Remote,
    /// Use the cache once the task list has been loaded, the gateway otherwise.
    #[default]
    Auto,
}

/// Calendar day of `instant` as seen from `offset`.
pub fn day_of(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Two instants are the same day when they fall on the same local date, time of day ignored.
pub fn same_day(a: DateTime<Utc>, b: DateTime<Utc>, offset: FixedOffset) -> bool {
    day_of(a, offset) == day_of(b, offset)
}

pub fn in_window(instant: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start <= instant && instant <= end
}

/// Scheduled tasks whose start lies in `[start, end]`, both ends inclusive.
pub fn tasks_in_range(tasks: &[Task], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| {
            task.scheduled_date
                .map(|at| in_window(at, start, end))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Scheduled tasks starting on `day` in the given offset.
pub fn tasks_on(tasks: &[Task], day: NaiveDate, offset: FixedOffset) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| {
            task.scheduled_date
                .map(|at| day_of(at, offset) == day)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
