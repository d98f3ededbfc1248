//! Mutation records: a pending change together with the data needed to undo it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};

use crate::habit_log::{self, LogRange};
use crate::model::{HabitLog, HabitWithStats, Task};
use crate::store::{self, Collections};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateTask,
    UpdateTask,
    DeleteTask,
    CreateHabit,
    UpdateHabit,
    DeleteHabit,
    LogHabit,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::CreateTask => "create task",
            MutationKind::UpdateTask => "update task",
            MutationKind::DeleteTask => "delete task",
            MutationKind::CreateHabit => "create habit",
            MutationKind::UpdateHabit => "update habit",
            MutationKind::DeleteHabit => "delete habit",
            MutationKind::LogHabit => "log habit",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pre-mutation state captured when the optimistic change was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// A provisional task was inserted; undo removes it.
    ProvisionalTask { temp_id: String },
    /// A task was edited; undo puts this value back.
    Task(Task),
    /// A task was removed; undo restores the whole list to keep its order.
    TaskList(Vec<Task>),
    ProvisionalHabit { temp_id: String },
    Habit(HabitWithStats),
    HabitList(Vec<HabitWithStats>),
    /// A habit was logged; undo restores that habit's entry for the day in the week window
    /// and in every range projection cached at the time. Other entries are left alone.
    HabitLogs {
        habit_id: String,
        date: DateTime<Utc>,
        offset: FixedOffset,
        /// `None` when the habit was not cached.
        week_entry: Option<Option<(usize, HabitLog)>>,
        ranges: BTreeMap<LogRange, Option<(usize, HabitLog)>>,
    },
}

impl Snapshot {
    /// Write the captured state back into `collections`.
    pub fn restore(self, collections: &mut Collections) {
        match self {
            Snapshot::ProvisionalTask { temp_id } => {
                store::remove(&mut collections.tasks, &temp_id);
            }
            Snapshot::Task(task) => {
                let id = task.id.clone();
                store::upsert(&mut collections.tasks, &id, task);
            }
            Snapshot::TaskList(tasks) => collections.tasks = tasks,
            Snapshot::ProvisionalHabit { temp_id } => {
                store::remove(&mut collections.habits, &temp_id);
            }
            Snapshot::Habit(habit) => {
                let id = habit.habit.id.clone();
                store::upsert(&mut collections.habits, &id, habit);
            }
            Snapshot::HabitList(habits) => collections.habits = habits,
            Snapshot::HabitLogs {
                habit_id,
                date,
                offset,
                week_entry,
                ranges,
            } => {
                if let (Some(before), Some(habit)) =
                    (week_entry, store::find_mut(&mut collections.habits, &habit_id))
                {
                    habit_log::restore_day(&mut habit.week_logs, &habit_id, date, offset, before);
                }
                for (range, before) in ranges {
                    if let Some(cached) = collections.habit_logs.get_mut(&range) {
                        habit_log::restore_day(&mut cached.logs, &habit_id, date, offset, before);
                    }
                }
            }
        }
    }

    pub(crate) fn capture_habit_logs(
        collections: &Collections,
        habit_id: &str,
        date: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        let week_entry = store::find(&collections.habits, habit_id)
            .map(|habit| habit_log::day_entry(&habit.week_logs, habit_id, date, offset));
        let ranges = collections
            .habit_logs
            .iter()
            .map(|(range, cached)| {
                (*range, habit_log::day_entry(&cached.logs, habit_id, date, offset))
            })
            .collect();
        Snapshot::HabitLogs {
            habit_id: habit_id.to_string(),
            date,
            offset,
            week_entry,
            ranges,
        }
    }
}

/// One optimistic mutation moving from pending to confirmed or rolled back.
#[derive(Debug, Clone)]
pub struct Mutation {
    id: u64,
    kind: MutationKind,
    target: String,
    state: MutationState,
    snapshot: Option<Snapshot>,
}

impl Mutation {
    pub fn new(id: u64, kind: MutationKind, target: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            id,
            kind,
            target: target.into(),
            state: MutationState::Pending,
            snapshot: Some(snapshot),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The remote call succeeded; the snapshot is no longer needed.
    pub fn confirm(&mut self) {
        if self.state == MutationState::Pending {
            self.state = MutationState::Confirmed;
            self.snapshot = None;
        }
    }

    /// Restore the snapshot. A settled mutation is left untouched.
    pub fn roll_back(&mut self, collections: &mut Collections) {
        if self.state != MutationState::Pending {
            return;
        }
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore(collections);
        }
        self.state = MutationState::RolledBack;
    }

    pub fn summary(&self) -> MutationSummary {
        MutationSummary {
            id: self.id,
            kind: self.kind,
            target: self.target.clone(),
            state: self.state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSummary {
    pub id: u64,
    pub kind: MutationKind,
    pub target: String,
    pub state: MutationState,
}

/// Mark every habit-derived projection as due for an authoritative refresh.
pub(crate) fn invalidate_habits(collections: &mut Collections) {
    collections.habits_stale = true;
    habit_log::mark_stale(&mut collections.habit_logs);
}
