//! In-memory gateway for exercising the engine without a server.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayResult};
use crate::model::{
    Habit, HabitDraft, HabitLog, HabitPatch, HabitWithStats, Task, TaskDraft, TaskPatch,
};

struct Gate {
    arrived: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Handle for a call parked by [`ScriptedGateway::hold_next`].
pub(crate) struct HeldCall {
    pub(crate) arrived: oneshot::Receiver<()>,
    pub(crate) release: oneshot::Sender<()>,
}

#[derive(Default)]
struct ServerState {
    tasks: Vec<Task>,
    habits: Vec<HabitWithStats>,
    logs: Vec<HabitLog>,
    next_id: u64,
}

pub(crate) struct ScriptedGateway {
    server: Mutex<ServerState>,
    failures: Mutex<VecDeque<GatewayError>>,
    gate: Mutex<Option<Gate>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self {
            server: Mutex::new(ServerState {
                next_id: 42,
                ..ServerState::default()
            }),
            failures: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_tasks(self, tasks: Vec<Task>) -> Self {
        self.server.lock().tasks = tasks;
        self
    }

    pub(crate) fn with_habits(self, habits: Vec<HabitWithStats>) -> Self {
        self.server.lock().habits = habits;
        self
    }

    /// The next call fails with `err` instead of touching server state.
    pub(crate) fn fail_next(&self, err: GatewayError) {
        self.failures.lock().push_back(err);
    }

    /// Park the next call until the returned handle releases it.
    pub(crate) fn hold_next(&self) -> HeldCall {
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock() = Some(Gate {
            arrived: arrived_tx,
            release: release_rx,
        });
        HeldCall {
            arrived: arrived_rx,
            release: release_tx,
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn server_tasks(&self) -> Vec<Task> {
        self.server.lock().tasks.clone()
    }

    async fn enter(&self, call: &str) -> GatewayResult<()> {
        self.calls.lock().push(call.to_string());
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.arrived.send(());
            let _ = gate.release.await;
        }
        let failure = self.failures.lock().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(id: &str) -> GatewayError {
        GatewayError::Status {
            status: 404,
            message: format!("{id} not found"),
        }
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        self.enter("list_tasks").await?;
        Ok(self.server.lock().tasks.clone())
    }

    async fn list_tasks_by_project(&self, project_id: &str) -> GatewayResult<Vec<Task>> {
        self.enter("list_tasks_by_project").await?;
        Ok(self
            .server
            .lock()
            .tasks
            .iter()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect())
    }

    async fn list_tasks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Task>> {
        self.enter("list_tasks_in_range").await?;
        Ok(crate::calendar::tasks_in_range(
            &self.server.lock().tasks,
            start,
            end,
        ))
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task> {
        self.enter("create_task").await?;
        let mut server = self.server.lock();
        let id = server.next_id.to_string();
        server.next_id += 1;
        let task = draft.provisional(id);
        server.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> GatewayResult<Task> {
        self.enter("update_task").await?;
        let mut server = self.server.lock();
        let slot = server
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Self::missing(id))?;
        *slot = patch.apply(slot);
        Ok(slot.clone())
    }

    async fn delete_task(&self, id: &str) -> GatewayResult<Task> {
        self.enter("delete_task").await?;
        let mut server = self.server.lock();
        let index = server
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Self::missing(id))?;
        Ok(server.tasks.remove(index))
    }

    async fn list_habits_with_stats(&self) -> GatewayResult<Vec<HabitWithStats>> {
        self.enter("list_habits_with_stats").await?;
        Ok(self.server.lock().habits.clone())
    }

    async fn create_habit(&self, draft: &HabitDraft) -> GatewayResult<Habit> {
        self.enter("create_habit").await?;
        let mut server = self.server.lock();
        let id = format!("h{}", server.next_id);
        server.next_id += 1;
        let habit = draft.provisional(id);
        server.habits.push(HabitWithStats::unscored(habit.clone()));
        Ok(habit)
    }

    async fn update_habit(&self, id: &str, patch: &HabitPatch) -> GatewayResult<Habit> {
        self.enter("update_habit").await?;
        let mut server = self.server.lock();
        let slot = server
            .habits
            .iter_mut()
            .find(|h| h.habit.id == id)
            .ok_or_else(|| Self::missing(id))?;
        slot.habit = patch.apply(&slot.habit);
        Ok(slot.habit.clone())
    }

    async fn delete_habit(&self, id: &str) -> GatewayResult<()> {
        self.enter("delete_habit").await?;
        let mut server = self.server.lock();
        let before = server.habits.len();
        server.habits.retain(|h| h.habit.id != id);
        if server.habits.len() == before {
            return Err(Self::missing(id));
        }
        Ok(())
    }

    async fn log_habit(
        &self,
        id: &str,
        date: Option<DateTime<Utc>>,
        completed: Option<bool>,
    ) -> GatewayResult<HabitLog> {
        self.enter("log_habit").await?;
        let mut server = self.server.lock();
        let log_id = format!("log{}", server.next_id);
        server.next_id += 1;
        let log = HabitLog {
            id: log_id,
            habit: id.to_string(),
            date: date.unwrap_or_else(Utc::now),
            completed: completed.unwrap_or(true),
            note: None,
        };
        server.logs.push(log.clone());
        Ok(log)
    }

    async fn list_habit_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<HabitLog>> {
        self.enter("list_habit_logs").await?;
        Ok(self
            .server
            .lock()
            .logs
            .iter()
            .filter(|log| start <= log.date && log.date <= end)
            .cloned()
            .collect())
    }
}
