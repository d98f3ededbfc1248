//! In-memory entity store: canonical task/habit collections plus derived read views.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::calendar;
use crate::habit_log::{LogRange, RangeLogs};
use crate::model::{Entity, HabitWithStats, Task};
use crate::observer::{Event, EventBus, Topic};

/// Everything the store owns. Snapshots restore into this shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub tasks: Vec<Task>,
    pub habits: Vec<HabitWithStats>,
    pub habit_logs: BTreeMap<LogRange, RangeLogs>,
    pub tasks_loaded: bool,
    pub habits_stale: bool,
}

struct StoreState {
    collections: Collections,
    version: u64,
}

pub struct EntityStore {
    state: Mutex<StoreState>,
    bus: Arc<EventBus>,
}

impl EntityStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                collections: Collections::default(),
                version: 0,
            }),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn snapshot(&self) -> Collections {
        self.state.lock().collections.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().collections.tasks.clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        find(&self.state.lock().collections.tasks, id).cloned()
    }

    /// True once a full task list has been loaded from the gateway.
    pub fn is_hydrated(&self) -> bool {
        self.state.lock().collections.tasks_loaded
    }

    pub fn scheduled(&self) -> Vec<Task> {
        scheduled(&self.state.lock().collections.tasks)
    }

    pub fn unscheduled_open(&self) -> Vec<Task> {
        unscheduled_open(&self.state.lock().collections.tasks)
    }

    pub fn tasks_on(&self, day: NaiveDate, offset: FixedOffset) -> Vec<Task> {
        calendar::tasks_on(&self.state.lock().collections.tasks, day, offset)
    }

    pub fn tasks_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Task> {
        calendar::tasks_in_range(&self.state.lock().collections.tasks, start, end)
    }

    pub fn tasks_for_project(&self, project_id: &str) -> Vec<Task> {
        self.state
            .lock()
            .collections
            .tasks
            .iter()
            .filter(|task| task.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect()
    }

    pub fn habits(&self) -> Vec<HabitWithStats> {
        self.state.lock().collections.habits.clone()
    }

    pub fn habit(&self, id: &str) -> Option<HabitWithStats> {
        find(&self.state.lock().collections.habits, id).cloned()
    }

    pub fn habits_stale(&self) -> bool {
        self.state.lock().collections.habits_stale
    }

    pub fn habit_logs(&self, range: &LogRange) -> Option<RangeLogs> {
        self.state.lock().collections.habit_logs.get(range).cloned()
    }

    pub fn stale_ranges(&self) -> Vec<LogRange> {
        self.state
            .lock()
            .collections
            .habit_logs
            .iter()
            .filter(|(_, cached)| cached.stale)
            .map(|(range, _)| *range)
            .collect()
    }

    /// Run one mutation against the collections, then notify `topics`.
    ///
    /// Nothing is committed or announced when `apply` returns `Err`. Listeners run after the
    /// lock is released.
    pub(crate) fn try_commit<R, E>(
        &self,
        topics: &[Topic],
        apply: impl FnOnce(&mut Collections) -> Result<R, E>,
    ) -> Result<R, E> {
        let (result, version) = {
            let mut state = self.state.lock();
            let result = apply(&mut state.collections)?;
            state.version = state.version.wrapping_add(1);
            (result, state.version)
        };
        for topic in topics {
            self.bus.notify(*topic, &change_event(*topic, version));
        }
        Ok(result)
    }

    pub(crate) fn commit<R>(&self, topics: &[Topic], apply: impl FnOnce(&mut Collections) -> R) -> R {
        match self.try_commit::<R, std::convert::Infallible>(topics, |c| Ok(apply(c))) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }
}

fn change_event(topic: Topic, version: u64) -> Event {
    match topic {
        Topic::Habits => Event::HabitsChanged { version },
        Topic::HabitLogs => Event::HabitLogsChanged { version },
        _ => Event::TasksChanged { version },
    }
}

/// Tasks with a scheduled start.
pub fn scheduled(tasks: &[Task]) -> Vec<Task> {
    tasks.iter().filter(|t| t.is_scheduled()).cloned().collect()
}

/// Tasks without a scheduled start that are not done yet.
pub fn unscheduled_open(tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| !t.is_scheduled() && !t.is_done())
        .cloned()
        .collect()
}

pub(crate) fn find<'a, T: Entity>(items: &'a [T], id: &str) -> Option<&'a T> {
    items.iter().find(|item| item.id() == id)
}

pub(crate) fn find_mut<'a, T: Entity>(items: &'a mut [T], id: &str) -> Option<&'a mut T> {
    items.iter_mut().find(|item| item.id() == id)
}

/// Replace the entity with `id` in place, or append when it is gone.
pub(crate) fn upsert<T: Entity>(items: &mut Vec<T>, id: &str, entity: T) {
    match find_mut(items, id) {
        Some(slot) => *slot = entity,
        None => items.push(entity),
    }
}

/// Swap a provisional entity for its confirmed version, dropping any other copy of the
/// confirmed identity (a refresh may have brought it in already).
pub(crate) fn confirm_provisional<T: Entity>(items: &mut Vec<T>, temp_id: &str, entity: T) {
    let confirmed_id = entity.id().to_string();
    items.retain(|item| item.id() != confirmed_id);
    upsert(items, temp_id, entity);
}

pub(crate) fn remove<T: Entity>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let index = items.iter().position(|item| item.id() == id)?;
    Some(items.remove(index))
}
