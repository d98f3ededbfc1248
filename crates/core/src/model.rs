use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

/// Prefix carried by every client-generated identity. Server identities never start with it.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Generate a fresh temporary identity for a provisional entity.
pub fn temporary_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Ulid::new())
}

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Task,
    Habit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Task => write!(f, "task"),
            EntityKind::Habit => write!(f, "habit"),
        }
    }
}

/// Anything the store keeps in an identity-keyed list.
pub trait Entity: Clone {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Backlog,
    Todo,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backlog" => Ok(TaskStatus::Backlog),
            "todo" => Ok(TaskStatus::Todo),
            "done" => Ok(TaskStatus::Done),
            other => Err(anyhow!(
                "Unknown status '{}': expected backlog|todo|done",
                other
            )),
        }
    }
}

impl ValueEnum for TaskStatus {
    fn value_variants<'a>() -> &'a [Self] {
        const VARIANTS: [TaskStatus; 3] = [TaskStatus::Backlog, TaskStatus::Todo, TaskStatus::Done];
        &VARIANTS
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Google Calendar linkage kept alongside a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSync {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(flatten)]
    pub google: GoogleSync,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "__v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl Task {
    pub fn is_provisional(&self) -> bool {
        is_temporary_id(&self.id)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_date.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

impl Entity for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Fields a client may set when creating a task. Carries no identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub is_urgent: bool,
    pub is_important: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Build the placeholder entity shown while the create call is in flight.
    pub fn provisional(&self, id: String) -> Task {
        Task {
            id,
            title: self.title.trim().to_string(),
            project_id: self.project_id.clone(),
            description: self.description.clone(),
            scheduled_date: self.scheduled_date,
            scheduled_end_date: self.scheduled_end_date,
            deadline: self.deadline,
            is_urgent: self.is_urgent,
            is_important: self.is_important,
            completed: false,
            status: self.status.unwrap_or_default(),
            google: GoogleSync::default(),
            created_at: None,
            updated_at: None,
            version: None,
        }
    }
}

/// Partial update for a task. `Some(None)` on a nullable field clears it.
///
/// Server-managed fields (`_id`, timestamps, `__v`) have no representation here, so an
/// outbound patch can never carry them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_end_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_urgent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn complete() -> Self {
        Self {
            completed: Some(true),
            status: Some(TaskStatus::Done),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Return a copy of `task` with the patch applied. Completion forces the done status.
    pub fn apply(&self, task: &Task) -> Task {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(project_id) = &self.project_id {
            next.project_id = project_id.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(scheduled) = self.scheduled_date {
            next.scheduled_date = scheduled;
        }
        if let Some(scheduled_end) = self.scheduled_end_date {
            next.scheduled_end_date = scheduled_end;
        }
        if let Some(deadline) = self.deadline {
            next.deadline = deadline;
        }
        if let Some(urgent) = self.is_urgent {
            next.is_urgent = urgent;
        }
        if let Some(important) = self.is_important {
            next.is_important = important;
        }
        if let Some(completed) = self.completed {
            next.completed = completed;
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if next.completed {
            next.status = TaskStatus::Done;
        }
        next
    }
}

impl From<&Task> for TaskPatch {
    fn from(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            project_id: Some(task.project_id.clone()),
            description: Some(task.description.clone()),
            scheduled_date: Some(task.scheduled_date),
            scheduled_end_date: Some(task.scheduled_end_date),
            deadline: Some(task.deadline),
            is_urgent: Some(task.is_urgent),
            is_important: Some(task.is_important),
            completed: Some(task.completed),
            status: Some(task.status),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub frequency: Frequency,
    /// Weekday indices, 0 = Sunday through 6 = Saturday.
    #[serde(default)]
    pub target_days: BTreeSet<u8>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDraft {
    pub name: String,
    pub icon: String,
    pub color: String,
    pub frequency: Frequency,
    pub target_days: BTreeSet<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HabitDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_days: (0..7).collect(),
            ..Self::default()
        }
    }

    pub fn provisional(&self, id: String) -> Habit {
        Habit {
            id,
            name: self.name.trim().to_string(),
            icon: self.icon.clone(),
            color: self.color.clone(),
            frequency: self.frequency,
            target_days: self.target_days.clone(),
            is_active: true,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_days: Option<BTreeSet<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

impl HabitPatch {
    pub fn apply(&self, habit: &Habit) -> Habit {
        let mut next = habit.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(icon) = &self.icon {
            next.icon = icon.clone();
        }
        if let Some(color) = &self.color {
            next.color = color.clone();
        }
        if let Some(frequency) = self.frequency {
            next.frequency = frequency;
        }
        if let Some(days) = &self.target_days {
            next.target_days = days.clone();
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitLog {
    #[serde(rename = "_id")]
    pub id: String,
    /// Always a plain habit identity once deserialized, whatever shape the server sent.
    #[serde(rename = "habitId", deserialize_with = "habit_ref")]
    pub habit: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HabitLog {
    pub fn provisional(habit: &str, date: DateTime<Utc>) -> Self {
        Self {
            id: temporary_id(),
            habit: habit.to_string(),
            date,
            completed: true,
            note: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HabitRefRepr {
    Id(String),
    Document {
        #[serde(rename = "_id")]
        id: String,
    },
}

fn habit_ref<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match HabitRefRepr::deserialize(deserializer)? {
        HabitRefRepr::Id(id) | HabitRefRepr::Document { id } => id,
    })
}

/// Server-computed habit projection. Only `week_logs` is ever patched locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitWithStats {
    #[serde(flatten)]
    pub habit: Habit,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub total_completions: u32,
    #[serde(default)]
    pub completion_rate: f64,
    #[serde(default)]
    pub week_logs: Vec<HabitLog>,
}

impl HabitWithStats {
    /// Wrap a habit the server has not computed stats for yet.
    pub fn unscored(habit: Habit) -> Self {
        Self {
            habit,
            current_streak: 0,
            longest_streak: 0,
            total_completions: 0,
            completion_rate: 0.0,
            week_logs: Vec::new(),
        }
    }
}

impl Entity for HabitWithStats {
    fn id(&self) -> &str {
        &self.habit.id
    }
}
