//! Remote data gateway consumed by the mutation engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::GatewayError;
use crate::model::{Habit, HabitDraft, HabitLog, HabitPatch, HabitWithStats, Task, TaskDraft, TaskPatch};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_tasks(&self) -> GatewayResult<Vec<Task>>;

    async fn list_tasks_by_project(&self, project_id: &str) -> GatewayResult<Vec<Task>>;

    async fn list_tasks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Task>>;

    /// The server assigns the identity.
    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task>;

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> GatewayResult<Task>;

    /// Returns the deleted entity.
    async fn delete_task(&self, id: &str) -> GatewayResult<Task>;

    async fn list_habits_with_stats(&self) -> GatewayResult<Vec<HabitWithStats>>;

    async fn create_habit(&self, draft: &HabitDraft) -> GatewayResult<Habit>;

    async fn update_habit(&self, id: &str, patch: &HabitPatch) -> GatewayResult<Habit>;

    async fn delete_habit(&self, id: &str) -> GatewayResult<()>;

    async fn log_habit(
        &self,
        id: &str,
        date: Option<DateTime<Utc>>,
        completed: Option<bool>,
    ) -> GatewayResult<HabitLog>;

    async fn list_habit_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<HabitLog>>;
}
