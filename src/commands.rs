use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::cli::{
    AddArgs, CalendarArgs, CliCommand, HabitAddArgs, HabitsCommand, ListArgs, LogArgs,
    TasksCommand, UpdateArgs,
};
use crate::config::AppConfig;
use crate::core::{
    EntityStore, Event, EventBus, Gateway, HabitDraft, HabitWithStats, LogIntent, MutationEngine,
    Notice, RangeSource, Task, TaskDraft, TaskPatch, Topic,
};
use crate::http::{HttpGateway, TokenStore};

/// Wire an engine to the HTTP gateway described by `config`.
pub fn connect(config: &AppConfig) -> Result<MutationEngine<HttpGateway>> {
    let bus = Arc::new(EventBus::new());
    let tokens = TokenStore::new(config.api_token().map(str::to_string)).with_bus(bus.clone());
    let gateway = HttpGateway::from_config(config, Arc::new(tokens))
        .context("Failed to build HTTP client")?;
    let store = Arc::new(EntityStore::new(bus));
    Ok(MutationEngine::new(
        Arc::new(gateway),
        store,
        config.utc_offset(),
    ))
}

/// Run one command. Rollback notices raised along the way are written to `errors`.
pub async fn execute<G, W, E>(
    engine: &MutationEngine<G>,
    command: CliCommand,
    mut writer: W,
    mut errors: E,
) -> Result<()>
where
    G: Gateway,
    W: Write,
    E: Write,
{
    let notices = Arc::new(Mutex::new(Vec::<Notice>::new()));
    let sink = notices.clone();
    let subscription = engine.bus().subscribe(Topic::Notices, move |event| {
        if let Event::Notice(notice) = event {
            sink.lock().push(notice.clone());
        }
    });

    let result = match command {
        CliCommand::Tasks(command) => handle_tasks(engine, command, &mut writer).await,
        CliCommand::Calendar(args) => handle_calendar(engine, &args, &mut writer).await,
        CliCommand::Habits(command) => handle_habits(engine, command, &mut writer).await,
    };

    engine.bus().unsubscribe(subscription);
    for notice in notices.lock().iter() {
        writeln!(errors, "Could not {}: {}", notice.action, notice.message)?;
    }
    result
}

async fn handle_tasks<G: Gateway, W: Write>(
    engine: &MutationEngine<G>,
    command: TasksCommand,
    writer: &mut W,
) -> Result<()> {
    let offset = engine.utc_offset();
    match command {
        TasksCommand::List(args) => {
            let tasks = list_tasks(engine, &args).await?;
            if tasks.is_empty() {
                writeln!(writer, "No tasks")?;
            }
            for task in &tasks {
                writeln!(writer, "{}", task_line(task, offset))?;
            }
        }
        TasksCommand::Add(args) => {
            let draft = draft_from(&args, offset)?;
            engine.refresh_tasks().await.context("Failed to load tasks")?;
            let task = engine.create_task(draft).await?;
            writeln!(writer, "Created {}", task_line(&task, offset))?;
        }
        TasksCommand::Update(args) => {
            let patch = patch_from(&args, offset)?;
            if patch.is_empty() {
                return Err(anyhow!("Nothing to update for task {}", args.id));
            }
            engine.refresh_tasks().await.context("Failed to load tasks")?;
            let task = engine.update_task(&args.id, patch).await?;
            writeln!(writer, "Updated {}", task_line(&task, offset))?;
        }
        TasksCommand::Done(args) => {
            engine.refresh_tasks().await.context("Failed to load tasks")?;
            let task = engine.update_task(&args.id, TaskPatch::complete()).await?;
            writeln!(writer, "Completed {}", task_line(&task, offset))?;
        }
        TasksCommand::Rm(args) => {
            engine.refresh_tasks().await.context("Failed to load tasks")?;
            let task = engine.delete_task(&args.id).await?;
            writeln!(writer, "Deleted {}", task_line(&task, offset))?;
        }
    }
    Ok(())
}

async fn list_tasks<G: Gateway>(engine: &MutationEngine<G>, args: &ListArgs) -> Result<Vec<Task>> {
    if let Some(project) = &args.project {
        return engine
            .refresh_project_tasks(project)
            .await
            .with_context(|| format!("Failed to load tasks of project {project}"));
    }
    engine.refresh_tasks().await.context("Failed to load tasks")?;
    let store = engine.store();
    Ok(if args.scheduled {
        store.scheduled()
    } else if args.unscheduled {
        store.unscheduled_open()
    } else {
        store.tasks()
    })
}

async fn handle_calendar<G: Gateway, W: Write>(
    engine: &MutationEngine<G>,
    args: &CalendarArgs,
    writer: &mut W,
) -> Result<()> {
    let offset = engine.utc_offset();
    let start = parse_instant(&args.start, offset, false)?;
    let end = parse_instant(&args.end, offset, true)?;
    if end < start {
        return Err(anyhow!("Calendar end {} is before start {}", args.end, args.start));
    }
    let source = if args.remote {
        RangeSource::Remote
    } else {
        engine.refresh_tasks().await.context("Failed to load tasks")?;
        RangeSource::Cache
    };
    let tasks = engine
        .tasks_in_range(start, end, source)
        .await
        .context("Failed to load calendar")?;
    if tasks.is_empty() {
        writeln!(writer, "Nothing scheduled")?;
    }
    for task in &tasks {
        writeln!(writer, "{}", task_line(task, offset))?;
    }
    Ok(())
}

async fn handle_habits<G: Gateway, W: Write>(
    engine: &MutationEngine<G>,
    command: HabitsCommand,
    writer: &mut W,
) -> Result<()> {
    engine
        .refresh_habits()
        .await
        .context("Failed to load habits")?;
    match command {
        HabitsCommand::List => {
            let habits = engine.store().habits();
            if habits.is_empty() {
                writeln!(writer, "No habits")?;
            }
            for habit in &habits {
                writeln!(writer, "{}", habit_line(habit))?;
            }
        }
        HabitsCommand::Add(args) => {
            let habit = engine.create_habit(habit_draft_from(&args)).await?;
            writeln!(writer, "Created habit {}  {}", habit.id, habit.name)?;
        }
        HabitsCommand::Rm(args) => {
            engine.delete_habit(&args.id).await?;
            writeln!(writer, "Deleted habit {}", args.id)?;
        }
        HabitsCommand::Log(args) => {
            let log = engine.log_habit(intent_from(&args, engine.utc_offset())?).await?;
            let day = log.date.with_timezone(&engine.utc_offset()).date_naive();
            if args.undo {
                writeln!(writer, "Cleared {} for {}", args.id, day)?;
            } else {
                writeln!(writer, "Logged {} for {}", args.id, day)?;
            }
            engine
                .refresh_stale()
                .await
                .context("Failed to refresh habit stats")?;
        }
    }
    Ok(())
}

fn draft_from(args: &AddArgs, offset: FixedOffset) -> Result<TaskDraft> {
    let mut draft = TaskDraft::new(args.title.join(" "));
    draft.project_id = args.project.clone();
    draft.description = args.description.clone();
    draft.scheduled_date = parse_optional(args.scheduled.as_deref(), offset)?;
    draft.scheduled_end_date = parse_optional(args.scheduled_end.as_deref(), offset)?;
    draft.deadline = parse_optional(args.deadline.as_deref(), offset)?;
    draft.is_urgent = args.urgent;
    draft.is_important = args.important;
    draft.status = args.status;
    Ok(draft)
}

fn patch_from(args: &UpdateArgs, offset: FixedOffset) -> Result<TaskPatch> {
    let mut patch = TaskPatch {
        title: args.title.clone(),
        project_id: args.project.clone().map(Some),
        description: args.description.clone().map(Some),
        is_urgent: args.urgent,
        is_important: args.important,
        status: args.status,
        ..TaskPatch::default()
    };
    if args.unschedule {
        patch.scheduled_date = Some(None);
        patch.scheduled_end_date = Some(None);
    } else {
        patch.scheduled_date = parse_optional(args.scheduled.as_deref(), offset)?.map(Some);
        patch.scheduled_end_date = parse_optional(args.scheduled_end.as_deref(), offset)?.map(Some);
    }
    patch.deadline = parse_optional(args.deadline.as_deref(), offset)?.map(Some);
    Ok(patch)
}

fn habit_draft_from(args: &HabitAddArgs) -> HabitDraft {
    let mut draft = HabitDraft::new(args.name.join(" "));
    draft.icon = args.icon.clone();
    draft.color = args.color.clone();
    draft.frequency = args.frequency;
    if !args.days.is_empty() {
        draft.target_days = args.days.iter().copied().collect::<BTreeSet<_>>();
    }
    draft.description = args.description.clone();
    draft
}

fn intent_from(args: &LogArgs, offset: FixedOffset) -> Result<LogIntent> {
    let date = parse_optional(args.date.as_deref(), offset)?;
    Ok(if args.undo {
        LogIntent::undo(args.id.clone(), date)
    } else {
        LogIntent::complete(args.id.clone(), date)
    })
}

fn parse_optional(raw: Option<&str>, offset: FixedOffset) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_instant(value, offset, false))
        .transpose()
}

/// Accept RFC 3339 or a bare `YYYY-MM-DD`, read in `offset`. A bare `end` date covers the
/// whole day.
fn parse_instant(raw: &str, offset: FixedOffset, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{raw}': expected RFC 3339 or YYYY-MM-DD"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| anyhow!("Invalid end-of-day time"))?
    } else {
        NaiveTime::MIN
    };
    offset
        .from_local_datetime(&day.and_time(time))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Ambiguous local date '{raw}'"))
}

fn task_line(task: &Task, offset: FixedOffset) -> String {
    let mut line = format!("{}  [{}] {}", task.id, task.status, task.title);
    if let Some(start) = task.scheduled_date {
        line.push_str(&format!(
            "  @ {}",
            start.with_timezone(&offset).format("%Y-%m-%d %H:%M")
        ));
    }
    if task.is_urgent {
        line.push_str("  !urgent");
    }
    line
}

fn habit_line(habit: &HabitWithStats) -> String {
    format!(
        "{}  {}  streak {} (best {})  {:.0}% done",
        habit.habit.id,
        habit.habit.name,
        habit.current_streak,
        habit.longest_streak,
        habit.completion_rate
    )
}
