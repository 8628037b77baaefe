//! Local task store.
//!
//! Holds the in-memory `TasksByDate` map, persists it synchronously on every
//! mutation, and broadcasts a change event to subscribers (the view layer).
//! Mutation goes through copy-on-write: `update` hands the mutator a draft
//! copy, so callers can never observe or alias the pre-mutation map.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::storage::BlobStorage;
use crate::task::{Task, TasksByDate};

/// Storage key holding the serialized task map.
pub const TASKS_STORAGE_KEY: &str = "tasks";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    TasksChanged,
}

/// The offline-first task cache.
pub struct TaskStore {
    tasks: RwLock<TasksByDate>,
    storage: Arc<dyn BlobStorage>,
    events: broadcast::Sender<StoreEvent>,
}

impl TaskStore {
    /// Create a store, loading any persisted task map from storage.
    ///
    /// Malformed persisted entries are dropped rather than failing startup.
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        let tasks = storage
            .get(TASKS_STORAGE_KEY)
            .map(|raw| load_tasks(&raw))
            .unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tasks: RwLock::new(tasks),
            storage,
            events,
        }
    }

    /// Subscribe to store change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current task map.
    pub fn get(&self) -> TasksByDate {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole map, persist it, and notify unless silent.
    ///
    /// Empty date keys are pruned so they never persist.
    pub fn set(&self, mut tasks: TasksByDate, silent: bool) {
        tasks.retain(|_, list| !list.is_empty());
        self.persist(&tasks);
        *self.tasks.write().unwrap_or_else(PoisonError::into_inner) = tasks;
        if !silent {
            self.notify();
        }
    }

    /// Apply a mutation to a draft copy of the map and install the result.
    ///
    /// The mutator is free to add, remove, and mutate keys and tasks; the
    /// pre-mutation map is never exposed to it. The write lock is held for
    /// the whole clone-mutate-install cycle, so concurrent updates serialize
    /// instead of overwriting each other's changes.
    pub fn update(&self, mutator: impl FnOnce(&mut TasksByDate), silent: bool) {
        {
            let mut guard = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let mut draft = guard.clone();
            mutator(&mut draft);
            draft.retain(|_, list| !list.is_empty());
            self.persist(&draft);
            *guard = draft;
        }
        if !silent {
            self.notify();
        }
    }

    /// Emit a change event to all subscribers.
    pub fn notify(&self) {
        // Nobody listening is fine; the send result only signals that.
        let _ = self.events.send(StoreEvent::TasksChanged);
    }

    /// Find a task by id anywhere in the map.
    pub fn find_task(&self, id: &str) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks
            .values()
            .flat_map(|list| list.iter())
            .find(|t| t.id == id)
            .cloned()
    }

    fn persist(&self, tasks: &TasksByDate) {
        match serde_json::to_string(tasks) {
            Ok(serialized) => self.storage.set(TASKS_STORAGE_KEY, &serialized),
            Err(err) => tracing::warn!(error = %err, "failed to serialize task map"),
        }
    }
}

/// Parse a persisted blob, dropping malformed date entries and tasks.
fn load_tasks(raw: &str) -> TasksByDate {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(error = %err, "persisted task map is not valid JSON, starting empty");
            return TasksByDate::default();
        }
    };
    let Some(map) = value.as_object() else {
        tracing::warn!("persisted task map has unexpected shape, starting empty");
        return TasksByDate::default();
    };

    let mut tasks = TasksByDate::default();
    for (date_key, entry) in map {
        let Some(list) = entry.as_array() else { continue };
        let valid: Vec<Task> = list
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect();
        if !valid.is_empty() {
            tasks.insert(date_key.clone(), valid);
        }
    }
    tasks
}
