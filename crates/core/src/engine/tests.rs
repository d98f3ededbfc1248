use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::MutationEngine;
use crate::calendar::{day_of, RangeSource};
use crate::error::{GatewayError, MutationError};
use crate::habit_log::{LogIntent, LogRange};
use crate::model::{
    EntityKind, HabitDraft, HabitLog, HabitPatch, HabitWithStats, Task, TaskDraft, TaskPatch,
    TaskStatus,
};
use crate::mutation::{MutationKind, MutationState};
use crate::observer::{Event, EventBus, Notice, Topic};
use crate::store::EntityStore;
use crate::telemetry::{Event as TelemetryEvent, EVENT_CAPACITY};
use crate::testing::ScriptedGateway;

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
}

fn task(id: &str, title: &str) -> Task {
    TaskDraft::new(title).provisional(id.to_string())
}

fn scheduled(id: &str, day: u32) -> Task {
    let mut task = task(id, &format!("task {id}"));
    task.scheduled_date = Some(at(day, 9));
    task
}

fn habit(id: &str) -> HabitWithStats {
    HabitWithStats::unscored(HabitDraft::new(format!("habit {id}")).provisional(id.to_string()))
}

fn engine_with(gateway: ScriptedGateway) -> MutationEngine<ScriptedGateway> {
    let store = Arc::new(EntityStore::new(Arc::new(EventBus::new())));
    MutationEngine::new(Arc::new(gateway), store, utc())
}

async fn seeded(tasks: Vec<Task>) -> MutationEngine<ScriptedGateway> {
    let engine = engine_with(ScriptedGateway::new().with_tasks(tasks));
    engine.refresh_tasks().await.unwrap();
    engine
}

fn ids(engine: &MutationEngine<ScriptedGateway>) -> Vec<String> {
    engine.store().tasks().into_iter().map(|t| t.id).collect()
}

fn collect_notices(engine: &MutationEngine<ScriptedGateway>) -> Arc<Mutex<Vec<Notice>>> {
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    engine.bus().subscribe(Topic::Notices, move |event| {
        if let Event::Notice(notice) = event {
            sink.lock().push(notice.clone());
        }
    });
    notices
}

fn server_error() -> GatewayError {
    GatewayError::Status {
        status: 500,
        message: "boom".into(),
    }
}

#[tokio::test]
async fn create_task_swaps_provisional_for_server_entity() {
    let engine = seeded(vec![task("1", "Existing")]).await;

    let created = engine.create_task(TaskDraft::new("X")).await.unwrap();

    assert_eq!(created.id, "42");
    assert_eq!(created.status, TaskStatus::Backlog);
    assert_eq!(ids(&engine), vec!["1", "42"]);
    assert!(engine.store().tasks().iter().all(|t| !t.is_provisional()));
    assert_eq!(engine.mutations()[0].state, MutationState::Confirmed);
}

#[tokio::test]
async fn create_task_shows_provisional_while_in_flight() {
    let engine = Arc::new(seeded(vec![task("1", "Existing")]).await);
    let held = engine.gateway().hold_next();

    let worker = engine.clone();
    let handle = tokio::spawn(async move { worker.create_task(TaskDraft::new("X")).await });
    held.arrived.await.unwrap();

    let tasks = engine.store().tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[1].is_provisional());
    assert_eq!(tasks[1].title, "X");
    assert_eq!(engine.pending(), 1);

    held.release.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(ids(&engine), vec!["1", "42"]);
    assert_eq!(engine.pending(), 0);
}

#[tokio::test]
async fn failed_create_removes_provisional_and_notifies() {
    let engine = seeded(vec![task("1", "Existing")]).await;
    let notices = collect_notices(&engine);
    let before = engine.store().snapshot();
    engine.gateway().fail_next(server_error());

    let err = engine.create_task(TaskDraft::new("X")).await.unwrap_err();

    assert_eq!(err, MutationError::Remote(server_error()));
    assert_eq!(engine.store().snapshot(), before);
    let notices = notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].action, MutationKind::CreateTask.label());
    assert_eq!(engine.mutations()[0].state, MutationState::RolledBack);
}

#[tokio::test]
async fn blank_title_is_rejected_before_any_call() {
    let engine = seeded(vec![]).await;
    let err = engine.create_task(TaskDraft::new("   ")).await.unwrap_err();
    assert!(matches!(err, MutationError::Invalid(_)));
    assert_eq!(engine.gateway().calls(), vec!["list_tasks"]);
}

#[tokio::test]
async fn rejected_update_restores_previous_value() {
    let engine = seeded(vec![task("1", "Existing"), task("2", "Other")]).await;
    let before = engine.store().snapshot();
    engine.gateway().fail_next(server_error());

    let err = engine
        .update_task("1", TaskPatch::status(TaskStatus::Done))
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Remote(_)));
    assert_eq!(engine.store().snapshot(), before);
    assert_eq!(engine.store().task("1").unwrap().status, TaskStatus::Backlog);
}

#[tokio::test]
async fn update_applies_optimistically_then_takes_server_value() {
    let engine = Arc::new(seeded(vec![task("1", "Existing")]).await);
    let held = engine.gateway().hold_next();

    let worker = engine.clone();
    let handle =
        tokio::spawn(async move { worker.update_task("1", TaskPatch::complete()).await });
    held.arrived.await.unwrap();
    assert!(engine.store().task("1").unwrap().is_done());

    held.release.send(()).unwrap();
    let updated = handle.await.unwrap().unwrap();
    assert!(updated.completed);
    assert_eq!(engine.store().task("1").unwrap(), updated);
}

#[tokio::test]
async fn unknown_id_fails_without_remote_call() {
    let engine = seeded(vec![task("1", "Existing")]).await;
    let version = engine.store().version();

    let err = engine
        .update_task("missing", TaskPatch::complete())
        .await
        .unwrap_err();
    assert_eq!(err, MutationError::not_found(EntityKind::Task, "missing"));
    let err = engine.delete_task("missing").await.unwrap_err();
    assert_eq!(err, MutationError::not_found(EntityKind::Task, "missing"));

    assert_eq!(engine.store().version(), version);
    assert_eq!(engine.gateway().calls(), vec!["list_tasks"]);
    assert!(engine.mutations().is_empty());
}

#[tokio::test]
async fn delete_removes_and_failure_restores_order() {
    let engine = seeded(vec![task("1", "a"), task("2", "b"), task("3", "c")]).await;
    engine.gateway().fail_next(server_error());

    engine.delete_task("2").await.unwrap_err();
    assert_eq!(ids(&engine), vec!["1", "2", "3"]);

    let deleted = engine.delete_task("2").await.unwrap();
    assert_eq!(deleted.id, "2");
    assert_eq!(ids(&engine), vec!["1", "3"]);
    assert_eq!(engine.gateway().server_tasks().len(), 2);
}

#[tokio::test]
async fn unauthenticated_rollback_is_silent() {
    let engine = seeded(vec![task("1", "Existing")]).await;
    let notices = collect_notices(&engine);
    engine.gateway().fail_next(GatewayError::Unauthenticated);

    let err = engine.delete_task("1").await.unwrap_err();

    assert!(err.is_unauthenticated());
    assert_eq!(ids(&engine), vec!["1"]);
    assert!(notices.lock().is_empty());
    if engine.telemetry().is_enabled() {
        assert!(engine.telemetry().events().iter().any(|event| matches!(
            event,
            TelemetryEvent::MutationRolledBack { silent: true, .. }
        )));
    }
}

#[tokio::test]
async fn listeners_see_every_commit() {
    let engine = seeded(vec![task("1", "Existing")]).await;
    let versions = Arc::new(Mutex::new(Vec::new()));
    let sink = versions.clone();
    engine.bus().subscribe(Topic::Tasks, move |event| {
        if let Event::TasksChanged { version } = event {
            sink.lock().push(*version);
        }
    });

    engine.create_task(TaskDraft::new("X")).await.unwrap();

    let versions = versions.lock();
    assert_eq!(versions.len(), 2);
    assert!(versions[0] < versions[1]);
}

#[tokio::test]
async fn calendar_reads_cache_or_remote() {
    let engine = engine_with(ScriptedGateway::new().with_tasks(vec![
        scheduled("a", 1),
        scheduled("b", 4),
        scheduled("c", 9),
        task("d", "unscheduled"),
    ]));
    let (start, end) = (at(1, 0), at(7, 23));

    let remote = engine
        .tasks_in_range(start, end, RangeSource::Auto)
        .await
        .unwrap();
    assert_eq!(remote.len(), 2);
    assert_eq!(engine.gateway().calls(), vec!["list_tasks_in_range"]);
    assert!(engine.store().tasks().is_empty());

    engine.refresh_tasks().await.unwrap();
    let cached = engine
        .tasks_in_range(start, end, RangeSource::Auto)
        .await
        .unwrap();
    let cached_ids: Vec<_> = cached.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(cached_ids, vec!["a", "b"]);
    assert_eq!(engine.gateway().calls().len(), 2);

    engine
        .tasks_in_range(start, end, RangeSource::Remote)
        .await
        .unwrap();
    assert_eq!(engine.gateway().calls().len(), 3);
}

#[tokio::test]
async fn project_refresh_merges_into_resident_list() {
    let mut tagged = task("p1", "In project");
    tagged.project_id = Some("proj".into());
    let engine = engine_with(ScriptedGateway::new().with_tasks(vec![task("1", "a"), tagged]));

    let loaded = engine.refresh_project_tasks("proj").await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(ids(&engine), vec!["p1"]);
    assert_eq!(engine.store().tasks_for_project("proj").len(), 1);
}

#[tokio::test]
async fn habit_lifecycle_round_trips() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();

    let created = engine.create_habit(HabitDraft::new("Stretch")).await.unwrap();
    assert_eq!(created.id, "h42");
    assert!(engine.store().habit("h42").is_some());
    assert!(engine.store().habits_stale());

    let renamed = engine
        .update_habit(
            "h1",
            HabitPatch {
                name: Some("Read more".into()),
                ..HabitPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Read more");
    assert_eq!(engine.store().habit("h1").unwrap().habit.name, "Read more");

    engine.gateway().fail_next(server_error());
    engine.delete_habit("h1").await.unwrap_err();
    assert_eq!(engine.store().habits().len(), 2);

    engine.delete_habit("h1").await.unwrap();
    assert!(engine.store().habit("h1").is_none());
}

#[tokio::test]
async fn habit_draft_validation() {
    let engine = engine_with(ScriptedGateway::new());
    let mut draft = HabitDraft::new("Run");
    draft.target_days.insert(7);
    assert!(matches!(
        engine.create_habit(draft).await,
        Err(MutationError::Invalid(_))
    ));
    assert!(matches!(
        engine.create_habit(HabitDraft::new("")).await,
        Err(MutationError::Invalid(_))
    ));
    assert!(engine.gateway().calls().is_empty());
}

#[tokio::test]
async fn logging_today_then_undoing_leaves_no_entry() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let day = at(5, 8);

    let log = engine
        .log_habit(LogIntent::complete("h1", Some(day)))
        .await
        .unwrap();
    let week = engine.store().habit("h1").unwrap().week_logs;
    assert_eq!(week, vec![log.clone()]);
    assert!(!log.id.starts_with("tmp-"));

    engine
        .log_habit(LogIntent::undo("h1", Some(at(5, 20))))
        .await
        .unwrap();
    assert!(engine.store().habit("h1").unwrap().week_logs.is_empty());
    assert!(engine.store().habits_stale());
}

#[tokio::test]
async fn log_is_mirrored_into_covering_ranges_only() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let week = LogRange::new(at(1, 0), at(7, 23));
    let later = LogRange::new(at(8, 0), at(14, 23));
    engine.load_habit_logs(week.start, week.end).await.unwrap();
    engine.load_habit_logs(later.start, later.end).await.unwrap();

    let held = engine.gateway().hold_next();
    let engine = Arc::new(engine);
    let worker = engine.clone();
    let handle = tokio::spawn(async move {
        worker
            .log_habit(LogIntent::complete("h1", Some(at(3, 12))))
            .await
    });
    held.arrived.await.unwrap();

    let provisional = engine.store().habit_logs(&week).unwrap();
    assert_eq!(provisional.logs.len(), 1);
    assert!(provisional.logs[0].id.starts_with("tmp-"));
    assert!(engine.store().habit_logs(&later).unwrap().logs.is_empty());

    held.release.send(()).unwrap();
    let confirmed: HabitLog = handle.await.unwrap().unwrap();
    let cached = engine.store().habit_logs(&week).unwrap();
    assert_eq!(cached.logs, vec![confirmed]);
    assert!(cached.stale);
    assert_eq!(engine.store().stale_ranges(), vec![week, later]);
}

#[tokio::test]
async fn failed_log_restores_projections_and_marks_stale() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let week = LogRange::new(at(1, 0), at(7, 23));
    engine.load_habit_logs(week.start, week.end).await.unwrap();
    let notices = collect_notices(&engine);
    engine.gateway().fail_next(GatewayError::Network("offline".into()));

    engine
        .log_habit(LogIntent::complete("h1", Some(at(2, 9))))
        .await
        .unwrap_err();

    assert!(engine.store().habit("h1").unwrap().week_logs.is_empty());
    let cached = engine.store().habit_logs(&week).unwrap();
    assert!(cached.logs.is_empty());
    assert!(cached.stale);
    assert!(engine.store().habits_stale());
    assert_eq!(notices.lock().len(), 1);
}

#[tokio::test]
async fn refresh_stale_refetches_invalidated_projections() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let week = LogRange::new(at(1, 0), at(7, 23));
    engine.load_habit_logs(week.start, week.end).await.unwrap();
    assert_eq!(engine.refresh_stale().await.unwrap(), 0);

    engine
        .log_habit(LogIntent::complete("h1", Some(at(2, 9))))
        .await
        .unwrap();
    assert_eq!(engine.refresh_stale().await.unwrap(), 2);

    assert!(!engine.store().habits_stale());
    assert!(engine.store().stale_ranges().is_empty());
    assert_eq!(engine.store().habit_logs(&week).unwrap().logs.len(), 1);
}

#[tokio::test]
async fn ledger_tracks_each_mutation() {
    let engine = seeded(vec![task("1", "a")]).await;
    engine.update_task("1", TaskPatch::complete()).await.unwrap();
    engine.gateway().fail_next(server_error());
    engine.delete_task("1").await.unwrap_err();

    let states: Vec<_> = engine
        .mutations()
        .into_iter()
        .map(|m| (m.kind, m.state))
        .collect();
    assert_eq!(
        states,
        vec![
            (MutationKind::UpdateTask, MutationState::Confirmed),
            (MutationKind::DeleteTask, MutationState::RolledBack),
        ]
    );
}

#[tokio::test]
async fn logging_without_date_uses_today() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let before = day_of(Utc::now(), utc());

    engine
        .log_habit(LogIntent {
            habit_id: "h1".into(),
            date: None,
            completed: None,
        })
        .await
        .unwrap();
    let after = day_of(Utc::now(), utc());

    let week = engine.store().habit("h1").unwrap().week_logs;
    assert_eq!(week.len(), 1);
    let logged = day_of(week[0].date, utc());
    assert!(logged == before || logged == after);
    assert!(week[0].completed);

    engine
        .log_habit(LogIntent {
            habit_id: "h1".into(),
            date: None,
            completed: Some(false),
        })
        .await
        .unwrap();
    assert!(engine.store().habit("h1").unwrap().week_logs.is_empty());
}

#[tokio::test]
async fn log_on_last_day_of_range_is_mirrored_while_pending() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1")]));
    engine.refresh_habits().await.unwrap();
    let week = LogRange::new(at(4, 0), at(10, 0));
    engine.load_habit_logs(week.start, week.end).await.unwrap();

    let engine = Arc::new(engine);
    let held = engine.gateway().hold_next();
    let worker = engine.clone();
    let handle = tokio::spawn(async move {
        worker
            .log_habit(LogIntent::complete("h1", Some(at(10, 9))))
            .await
    });
    held.arrived.await.unwrap();

    assert_eq!(engine.store().habit_logs(&week).unwrap().logs.len(), 1);

    held.release.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(engine.store().habit_logs(&week).unwrap().logs.len(), 1);
}

#[tokio::test]
async fn telemetry_stays_bounded_on_a_busy_engine() {
    let engine = seeded(vec![task("1", "a")]).await;
    for _ in 0..EVENT_CAPACITY {
        engine.update_task("1", TaskPatch::complete()).await.unwrap();
    }
    assert!(engine.telemetry().events().len() <= EVENT_CAPACITY);
    assert_eq!(engine.mutations().len(), 128);
}

#[tokio::test]
async fn failed_log_keeps_other_habits_confirmed_meanwhile() {
    let engine = engine_with(ScriptedGateway::new().with_habits(vec![habit("h1"), habit("h2")]));
    engine.refresh_habits().await.unwrap();
    let week = LogRange::new(at(1, 0), at(7, 23));
    engine.load_habit_logs(week.start, week.end).await.unwrap();

    let engine = Arc::new(engine);
    let held = engine.gateway().hold_next();
    let worker = engine.clone();
    let handle = tokio::spawn(async move {
        worker
            .log_habit(LogIntent::complete("h1", Some(at(3, 9))))
            .await
    });
    held.arrived.await.unwrap();

    let other = engine
        .log_habit(LogIntent::complete("h2", Some(at(3, 10))))
        .await
        .unwrap();
    engine.gateway().fail_next(server_error());
    held.release.send(()).unwrap();
    handle.await.unwrap().unwrap_err();

    assert_eq!(engine.store().habit_logs(&week).unwrap().logs, vec![other.clone()]);
    assert_eq!(engine.store().habit("h2").unwrap().week_logs, vec![other]);
    assert!(engine.store().habit("h1").unwrap().week_logs.is_empty());
}
