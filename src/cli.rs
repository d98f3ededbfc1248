use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};

use crate::core::model::{Frequency, TaskStatus};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cadence",
    version,
    about = "Plan tasks and track habits against a Cadence server.",
    after_help = "Examples:\n  cadence tasks list --scheduled\n  cadence tasks add Write report --scheduled 2026-01-03\n  cadence calendar 2026-01-01 2026-01-07\n  cadence habits log 65a1f0 --undo"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the API base URL (e.g. http://localhost:3000/api)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, value_name = "TOKEN", global = true)]
    pub token: Option<String>,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// List and edit tasks
    #[command(subcommand)]
    Tasks(TasksCommand),
    /// Show scheduled tasks between two dates (inclusive)
    Calendar(CalendarArgs),
    /// List, edit and log habits
    #[command(subcommand)]
    Habits(HabitsCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TasksCommand {
    /// List tasks (all, scheduled, unscheduled or by project)
    List(ListArgs),
    /// Create a task
    Add(AddArgs),
    /// Change fields of an existing task
    Update(UpdateArgs),
    /// Mark a task as completed
    Done(IdArgs),
    /// Delete a task
    Rm(IdArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only tasks with a scheduled start
    #[arg(long, conflicts_with_all = ["unscheduled", "project"])]
    pub scheduled: bool,

    /// Only open tasks without a scheduled start
    #[arg(long, conflicts_with = "project")]
    pub unscheduled: bool,

    /// Only tasks of the given project
    #[arg(long, value_name = "ID")]
    pub project: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title
    #[arg(value_name = "TITLE", required = true)]
    pub title: Vec<String>,

    #[arg(long, value_name = "ID")]
    pub project: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Scheduled start (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub scheduled: Option<String>,

    /// Scheduled end (RFC 3339 or YYYY-MM-DD)
    #[arg(long = "end", value_name = "DATE")]
    pub scheduled_end: Option<String>,

    #[arg(long, value_name = "DATE")]
    pub deadline: Option<String>,

    #[arg(long)]
    pub urgent: bool,

    #[arg(long)]
    pub important: bool,

    /// Initial status (defaults to backlog)
    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, value_name = "ID")]
    pub project: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_name = "DATE", conflicts_with = "unschedule")]
    pub scheduled: Option<String>,

    #[arg(long = "end", value_name = "DATE", conflicts_with = "unschedule")]
    pub scheduled_end: Option<String>,

    /// Clear the scheduled start and end
    #[arg(long)]
    pub unschedule: bool,

    #[arg(long, value_name = "DATE")]
    pub deadline: Option<String>,

    #[arg(long, value_name = "BOOL", value_parser = value_parser!(bool))]
    pub urgent: Option<bool>,

    #[arg(long, value_name = "BOOL", value_parser = value_parser!(bool))]
    pub important: Option<bool>,

    #[arg(long, value_enum)]
    pub status: Option<TaskStatus>,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct CalendarArgs {
    /// First day (RFC 3339 or YYYY-MM-DD)
    #[arg(value_name = "START")]
    pub start: String,

    /// Last day, inclusive (RFC 3339 or YYYY-MM-DD)
    #[arg(value_name = "END")]
    pub end: String,

    /// Ask the server instead of filtering the loaded task list
    #[arg(long)]
    pub remote: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HabitsCommand {
    /// List habits with their streaks
    List,
    /// Create a habit
    Add(HabitAddArgs),
    /// Delete a habit
    Rm(IdArgs),
    /// Mark a habit as done for a day (today by default)
    Log(LogArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HabitAddArgs {
    #[arg(value_name = "NAME", required = true)]
    pub name: Vec<String>,

    #[arg(long, default_value = "")]
    pub icon: String,

    #[arg(long, default_value = "")]
    pub color: String,

    #[arg(long, value_enum, default_value_t = Frequency::Daily)]
    pub frequency: Frequency,

    /// Weekday indices, 0 = Sunday (comma-separated or repeated flag; defaults to every day)
    #[arg(long = "day", value_delimiter = ',', action = ArgAction::Append, value_parser = value_parser!(u8).range(0..=6))]
    pub days: Vec<u8>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    /// Day to log (RFC 3339 or YYYY-MM-DD; defaults to now)
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,

    /// Remove the day's log instead of adding one
    #[arg(long)]
    pub undo: bool,
}
