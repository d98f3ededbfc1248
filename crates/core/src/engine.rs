//! Optimistic mutation engine.
//!
//! Every mutation commits to the [`EntityStore`] synchronously, then awaits the gateway. A
//! successful call merges the server's entity; a failed one restores the snapshot captured
//! at commit time. Store locks are never held across an `.await`.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;

use crate::calendar::RangeSource;
use crate::error::{GatewayError, MutationError};
use crate::gateway::Gateway;
use crate::habit_log::{self, LogIntent, LogRange, RangeLogs};
use crate::model::{
    temporary_id, EntityKind, Habit, HabitDraft, HabitLog, HabitPatch, HabitWithStats, Task,
    TaskDraft, TaskPatch,
};
use crate::mutation::{self, Mutation, MutationKind, MutationState, MutationSummary, Snapshot};
use crate::observer::{Event, EventBus, Notice, Topic};
use crate::store::{self, Collections, EntityStore};
use crate::telemetry::{self, Event as TelemetryEvent};

const LEDGER_CAPACITY: usize = 128;
const TASK_TOPICS: &[Topic] = &[Topic::Tasks];
const HABIT_TOPICS: &[Topic] = &[Topic::Habits];
const HABIT_LOG_TOPICS: &[Topic] = &[Topic::Habits, Topic::HabitLogs];

#[derive(Default)]
struct Ledger {
    next_id: u64,
    records: Vec<MutationSummary>,
}

impl Ledger {
    fn open(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, summary: MutationSummary) {
        match self.records.iter_mut().find(|r| r.id == summary.id) {
            Some(existing) => *existing = summary,
            None => {
                self.records.push(summary);
                if self.records.len() > LEDGER_CAPACITY {
                    self.records.remove(0);
                }
            }
        }
    }
}

pub struct MutationEngine<G> {
    gateway: Arc<G>,
    store: Arc<EntityStore>,
    telemetry: Arc<telemetry::Handle>,
    offset: FixedOffset,
    ledger: Mutex<Ledger>,
}

impl<G: Gateway> MutationEngine<G> {
    pub fn new(gateway: Arc<G>, store: Arc<EntityStore>, offset: FixedOffset) -> Self {
        Self {
            gateway,
            store,
            telemetry: Arc::new(telemetry::Handle::new()),
            offset,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.store.bus()
    }

    pub fn telemetry(&self) -> &Arc<telemetry::Handle> {
        &self.telemetry
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.offset
    }

    /// Recent mutations, oldest first.
    pub fn mutations(&self) -> Vec<MutationSummary> {
        self.ledger.lock().records.clone()
    }

    pub fn pending(&self) -> usize {
        self.ledger
            .lock()
            .records
            .iter()
            .filter(|r| r.state == MutationState::Pending)
            .count()
    }

    pub async fn refresh_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        let tasks = self.observe("tasks", self.gateway.list_tasks().await)?;
        self.store.commit(TASK_TOPICS, |c| {
            c.tasks = tasks.clone();
            c.tasks_loaded = true;
        });
        Ok(tasks)
    }

    /// Load one project's tasks and merge them into the resident list.
    pub async fn refresh_project_tasks(&self, project_id: &str) -> Result<Vec<Task>, GatewayError> {
        let tasks = self.observe("project tasks", self.gateway.list_tasks_by_project(project_id).await)?;
        self.store.commit(TASK_TOPICS, |c| {
            for task in &tasks {
                store::upsert(&mut c.tasks, &task.id, task.clone());
            }
        });
        Ok(tasks)
    }

    /// Scheduled tasks starting within `[start, end]`.
    pub async fn tasks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: RangeSource,
    ) -> Result<Vec<Task>, GatewayError> {
        let use_cache = match source {
            RangeSource::Cache => true,
            RangeSource::Remote => false,
            RangeSource::Auto => self.store.is_hydrated(),
        };
        if use_cache {
            return Ok(self.store.tasks_in_range(start, end));
        }
        self.observe(
            "calendar",
            self.gateway.list_tasks_in_range(start, end).await,
        )
    }

    pub async fn refresh_habits(&self) -> Result<Vec<HabitWithStats>, GatewayError> {
        let habits = self.observe("habits", self.gateway.list_habits_with_stats().await)?;
        self.store.commit(HABIT_TOPICS, |c| {
            c.habits = habits.clone();
            c.habits_stale = false;
        });
        Ok(habits)
    }

    /// Load habit logs for `[start, end]` and cache them as a range projection.
    pub async fn load_habit_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HabitLog>, GatewayError> {
        let logs = self.observe("habit logs", self.gateway.list_habit_logs(start, end).await)?;
        self.store.commit(&[Topic::HabitLogs], |c| {
            c.habit_logs.insert(
                LogRange::new(start, end),
                RangeLogs {
                    logs: logs.clone(),
                    stale: false,
                },
            );
        });
        Ok(logs)
    }

    /// Re-fetch every habit projection marked stale by a settled mutation.
    pub async fn refresh_stale(&self) -> Result<usize, GatewayError> {
        let mut refreshed = 0;
        if self.store.habits_stale() {
            self.refresh_habits().await?;
            refreshed += 1;
        }
        for range in self.store.stale_ranges() {
            self.load_habit_logs(range.start, range.end).await?;
            refreshed += 1;
        }
        Ok(refreshed)
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, MutationError> {
        if draft.title.trim().is_empty() {
            return Err(MutationError::Invalid("Task title cannot be empty".into()));
        }
        let temp_id = temporary_id();
        let provisional = draft.provisional(temp_id.clone());
        let mutation = self.begin(MutationKind::CreateTask, &temp_id, TASK_TOPICS, |c| {
            c.tasks.push(provisional);
            Ok(Snapshot::ProvisionalTask {
                temp_id: temp_id.clone(),
            })
        })?;

        match self.gateway.create_task(&draft).await {
            Ok(task) => {
                self.store.commit(TASK_TOPICS, |c| {
                    store::confirm_provisional(&mut c.tasks, &temp_id, task.clone())
                });
                self.confirm(mutation);
                Ok(task)
            }
            Err(err) => Err(self.roll_back(mutation, TASK_TOPICS, err)),
        }
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, MutationError> {
        let mutation = self.begin(MutationKind::UpdateTask, id, TASK_TOPICS, |c| {
            let slot = store::find_mut(&mut c.tasks, id)
                .ok_or_else(|| MutationError::not_found(EntityKind::Task, id))?;
            let before = slot.clone();
            *slot = patch.apply(&before);
            Ok(Snapshot::Task(before))
        })?;

        match self.gateway.update_task(id, &patch).await {
            Ok(task) => {
                self.store
                    .commit(TASK_TOPICS, |c| store::upsert(&mut c.tasks, id, task.clone()));
                self.confirm(mutation);
                Ok(task)
            }
            Err(err) => Err(self.roll_back(mutation, TASK_TOPICS, err)),
        }
    }

    pub async fn delete_task(&self, id: &str) -> Result<Task, MutationError> {
        let mutation = self.begin(MutationKind::DeleteTask, id, TASK_TOPICS, |c| {
            let before = c.tasks.clone();
            store::remove(&mut c.tasks, id)
                .ok_or_else(|| MutationError::not_found(EntityKind::Task, id))?;
            Ok(Snapshot::TaskList(before))
        })?;

        match self.gateway.delete_task(id).await {
            Ok(task) => {
                self.confirm(mutation);
                Ok(task)
            }
            Err(err) => Err(self.roll_back(mutation, TASK_TOPICS, err)),
        }
    }

    pub async fn create_habit(&self, draft: HabitDraft) -> Result<Habit, MutationError> {
        if draft.name.trim().is_empty() {
            return Err(MutationError::Invalid("Habit name cannot be empty".into()));
        }
        if let Some(day) = draft.target_days.iter().find(|day| **day > 6) {
            return Err(MutationError::Invalid(format!(
                "Target day {day} is not a weekday index (0-6)"
            )));
        }
        let temp_id = temporary_id();
        let provisional = HabitWithStats::unscored(draft.provisional(temp_id.clone()));
        let mutation = self.begin(MutationKind::CreateHabit, &temp_id, HABIT_TOPICS, |c| {
            c.habits.push(provisional);
            Ok(Snapshot::ProvisionalHabit {
                temp_id: temp_id.clone(),
            })
        })?;

        match self.gateway.create_habit(&draft).await {
            Ok(habit) => {
                self.store.commit(HABIT_TOPICS, |c| {
                    let confirmed = HabitWithStats::unscored(habit.clone());
                    store::confirm_provisional(&mut c.habits, &temp_id, confirmed);
                    c.habits_stale = true;
                });
                self.confirm(mutation);
                Ok(habit)
            }
            Err(err) => Err(self.roll_back(mutation, HABIT_TOPICS, err)),
        }
    }

    pub async fn update_habit(&self, id: &str, patch: HabitPatch) -> Result<Habit, MutationError> {
        let mutation = self.begin(MutationKind::UpdateHabit, id, HABIT_TOPICS, |c| {
            let slot = store::find_mut(&mut c.habits, id)
                .ok_or_else(|| MutationError::not_found(EntityKind::Habit, id))?;
            let before = slot.clone();
            slot.habit = patch.apply(&before.habit);
            Ok(Snapshot::Habit(before))
        })?;

        match self.gateway.update_habit(id, &patch).await {
            Ok(habit) => {
                self.store.commit(HABIT_TOPICS, |c| {
                    if let Some(slot) = store::find_mut(&mut c.habits, id) {
                        slot.habit = habit.clone();
                    }
                });
                self.confirm(mutation);
                Ok(habit)
            }
            Err(err) => Err(self.roll_back(mutation, HABIT_TOPICS, err)),
        }
    }

    pub async fn delete_habit(&self, id: &str) -> Result<(), MutationError> {
        let mutation = self.begin(MutationKind::DeleteHabit, id, HABIT_TOPICS, |c| {
            let before = c.habits.clone();
            store::remove(&mut c.habits, id)
                .ok_or_else(|| MutationError::not_found(EntityKind::Habit, id))?;
            Ok(Snapshot::HabitList(before))
        })?;

        match self.gateway.delete_habit(id).await {
            Ok(()) => {
                self.confirm(mutation);
                Ok(())
            }
            Err(err) => Err(self.roll_back(mutation, HABIT_TOPICS, err)),
        }
    }

    /// Mark or unmark a habit for a day, patching the week window and range projections
    /// before the server answers. Both projections are stale once the call settles.
    pub async fn log_habit(&self, intent: LogIntent) -> Result<HabitLog, MutationError> {
        let date = intent.date.unwrap_or_else(Utc::now);
        let habit_id = intent.habit_id.as_str();
        let offset = self.offset;
        let mutation = self.begin(MutationKind::LogHabit, habit_id, HABIT_LOG_TOPICS, |c| {
            let snapshot = Snapshot::capture_habit_logs(c, habit_id, date, offset);
            if let Some(habit) = store::find_mut(&mut c.habits, habit_id) {
                habit_log::reconcile(
                    &mut habit.week_logs,
                    habit_id,
                    date,
                    intent.completed,
                    offset,
                    true,
                );
            }
            habit_log::reconcile_ranges(&mut c.habit_logs, habit_id, date, intent.completed, offset);
            Ok(snapshot)
        })?;

        match self
            .gateway
            .log_habit(habit_id, Some(date), intent.completed)
            .await
        {
            Ok(log) => {
                self.store.commit(HABIT_LOG_TOPICS, |c| {
                    if let Some(habit) = store::find_mut(&mut c.habits, habit_id) {
                        habit_log::confirm(&mut habit.week_logs, &log, offset);
                    }
                    for cached in c.habit_logs.values_mut() {
                        habit_log::confirm(&mut cached.logs, &log, offset);
                    }
                    mutation::invalidate_habits(c);
                });
                self.confirm(mutation);
                Ok(log)
            }
            Err(err) => {
                let err = self.roll_back(mutation, HABIT_LOG_TOPICS, err);
                self.store.commit(HABIT_LOG_TOPICS, mutation::invalidate_habits);
                Err(err)
            }
        }
    }

    fn begin(
        &self,
        kind: MutationKind,
        target: &str,
        topics: &[Topic],
        apply: impl FnOnce(&mut Collections) -> Result<Snapshot, MutationError>,
    ) -> Result<Mutation, MutationError> {
        let snapshot = self.store.try_commit(topics, apply)?;
        let id = self.ledger.lock().open();
        let mutation = Mutation::new(id, kind, target, snapshot);
        self.ledger.lock().record(mutation.summary());
        self.telemetry.record(TelemetryEvent::MutationQueued {
            kind,
            target: target.to_string(),
        });
        Ok(mutation)
    }

    fn confirm(&self, mut mutation: Mutation) {
        mutation.confirm();
        self.ledger.lock().record(mutation.summary());
        self.telemetry.record(TelemetryEvent::MutationConfirmed {
            kind: mutation.kind(),
            target: mutation.target().to_string(),
        });
    }

    fn roll_back(&self, mut mutation: Mutation, topics: &[Topic], err: GatewayError) -> MutationError {
        self.store.commit(topics, |c| mutation.roll_back(c));
        self.ledger.lock().record(mutation.summary());
        let silent = err.is_silent();
        self.telemetry.record(TelemetryEvent::MutationRolledBack {
            kind: mutation.kind(),
            target: mutation.target().to_string(),
            error: err.to_string(),
            silent,
        });
        if !silent {
            let notice = Notice {
                action: mutation.kind().label().to_string(),
                message: err.to_string(),
            };
            self.bus().notify(Topic::Notices, &Event::Notice(notice));
        }
        MutationError::Remote(err)
    }

    fn observe<T>(
        &self,
        collection: &'static str,
        result: Result<Vec<T>, GatewayError>,
    ) -> Result<Vec<T>, GatewayError> {
        match &result {
            Ok(items) => self.telemetry.record(TelemetryEvent::RefreshCompleted {
                collection,
                count: items.len(),
            }),
            Err(err) => self.telemetry.record(TelemetryEvent::RefreshFailed {
                collection,
                error: err.to_string(),
            }),
        }
        result
    }
}

#[cfg(test)]
mod tests;
