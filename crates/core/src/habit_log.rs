//! Optimistic reconciliation of habit logs against cached week windows and range projections.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::calendar::{day_of, same_day};
use crate::model::HabitLog;

/// A request to mark (or unmark) a habit for a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogIntent {
    pub habit_id: String,
    pub date: Option<DateTime<Utc>>,
    /// `Some(false)` removes the day's log; `None` behaves like `Some(true)`.
    pub completed: Option<bool>,
}

impl LogIntent {
    pub fn complete(habit_id: impl Into<String>, date: Option<DateTime<Utc>>) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            completed: Some(true),
        }
    }

    pub fn undo(habit_id: impl Into<String>, date: Option<DateTime<Utc>>) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            completed: Some(false),
        }
    }

    pub fn removes(&self) -> bool {
        self.completed == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChange {
    Inserted,
    Completed,
    Removed,
    Unchanged,
}

/// Key of a cached habit-log range projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LogRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True when the local day of `instant` lies between the range's first and last day.
    pub fn covers_day(&self, instant: DateTime<Utc>, offset: FixedOffset) -> bool {
        let day = day_of(instant, offset);
        day_of(self.start, offset) <= day && day <= day_of(self.end, offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeLogs {
    pub logs: Vec<HabitLog>,
    pub stale: bool,
}

fn position(
    logs: &[HabitLog],
    habit_id: &str,
    date: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<usize> {
    logs.iter()
        .position(|log| log.habit == habit_id && same_day(log.date, date, offset))
}

/// Apply a log intent to one list, keeping at most one entry per (habit, day).
///
/// `may_insert` is false for lists whose window does not cover `date`; such lists are only
/// updated when they already hold a matching entry.
pub fn reconcile(
    logs: &mut Vec<HabitLog>,
    habit_id: &str,
    date: DateTime<Utc>,
    completed: Option<bool>,
    offset: FixedOffset,
    may_insert: bool,
) -> LogChange {
    let existing = position(logs, habit_id, date, offset);
    match (completed, existing) {
        (Some(false), Some(index)) => {
            logs.remove(index);
            LogChange::Removed
        }
        (Some(false), None) => LogChange::Unchanged,
        (_, Some(index)) => {
            if logs[index].completed {
                LogChange::Unchanged
            } else {
                logs[index].completed = true;
                LogChange::Completed
            }
        }
        (_, None) if may_insert => {
            logs.push(HabitLog::provisional(habit_id, date));
            LogChange::Inserted
        }
        (_, None) => LogChange::Unchanged,
    }
}

/// Mirror a log intent into every cached range projection that can hold it.
pub fn reconcile_ranges(
    ranges: &mut BTreeMap<LogRange, RangeLogs>,
    habit_id: &str,
    date: DateTime<Utc>,
    completed: Option<bool>,
    offset: FixedOffset,
) -> usize {
    let mut touched = 0;
    for (range, cached) in ranges.iter_mut() {
        let change = reconcile(
            &mut cached.logs,
            habit_id,
            date,
            completed,
            offset,
            range.covers_day(date, offset),
        );
        if change != LogChange::Unchanged {
            touched += 1;
        }
    }
    touched
}

/// Swap the provisional entry for the server's log, matched by (habit, day).
pub fn confirm(logs: &mut [HabitLog], confirmed: &HabitLog, offset: FixedOffset) -> bool {
    match position(logs, &confirmed.habit, confirmed.date, offset) {
        Some(index) if confirmed.completed => {
            logs[index] = confirmed.clone();
            true
        }
        _ => false,
    }
}

/// The entry for (habit, day) and its index, if the list holds one.
pub fn day_entry(
    logs: &[HabitLog],
    habit_id: &str,
    date: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<(usize, HabitLog)> {
    position(logs, habit_id, date, offset).map(|index| (index, logs[index].clone()))
}

/// Put the (habit, day) slot of `logs` back to `before`, leaving every other entry alone.
pub fn restore_day(
    logs: &mut Vec<HabitLog>,
    habit_id: &str,
    date: DateTime<Utc>,
    offset: FixedOffset,
    before: Option<(usize, HabitLog)>,
) {
    match (position(logs, habit_id, date, offset), before) {
        (Some(index), Some((_, log))) => logs[index] = log,
        (Some(index), None) => {
            logs.remove(index);
        }
        (None, Some((index, log))) => logs.insert(index.min(logs.len()), log),
        (None, None) => {}
    }
}

pub fn mark_stale(ranges: &mut BTreeMap<LogRange, RangeLogs>) {
    for cached in ranges.values_mut() {
        cached.stale = true;
    }
}
