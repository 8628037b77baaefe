//! Task action layer.
//!
//! Single-task mutations (toggle, edit, delete, add) follow one optimistic
//! pattern: snapshot the store, apply the change locally and notify the view
//! immediately, then push to the backend when a session is active. A push
//! failure restores the pre-mutation snapshot wholesale and emits a
//! user-visible notice; there is no field-level conflict resolution.
//!
//! Deletion supports deferred-commit undo: the task stays in the store for a
//! grace window (the view hides it via [`TaskActions::pending_delete_ids`]),
//! and undoing within the window cancels the removal with no network call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::client::ApiClient;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reconcile::SyncEngine;
use crate::store::TaskStore;
use crate::task::{is_valid_date, is_valid_time, now_millis, Priority, Task, TaskDiff};

const NOTICE_CHANNEL_CAPACITY: usize = 16;
const MAX_TITLE_CHARS: usize = 500;

/// User-visible notifications emitted by the action layer.
///
/// Background sync failures never appear here; only actions the user took
/// directly produce notices, because a rollback is something the user must
/// see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An added task reached the backend. Toggle and edit succeed silently.
    Saved,
    /// The change failed remotely and the local store was rolled back.
    Reverted { message: String },
    /// A deletion was scheduled; undo is available until the window elapses.
    Deleted { id: String, title: String },
    /// A scheduled deletion was undone.
    Restored,
}

/// A partial edit; `None` fields are left unchanged.
///
/// `date` and `time` are double-optional: `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<Option<String>>,
    pub time: Option<Option<String>>,
    pub completed: Option<bool>,
    pub is_reminder: Option<bool>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

struct PendingDelete {
    timer: Option<JoinHandle<()>>,
}

/// Issues single-task mutations against the store and the backend.
pub struct TaskActions {
    store: Arc<TaskStore>,
    client: Arc<ApiClient>,
    engine: Arc<SyncEngine>,
    config: Arc<SyncConfig>,
    notices: broadcast::Sender<Notice>,
    pending_deletes: Mutex<HashMap<String, PendingDelete>>,
}

impl TaskActions {
    pub fn new(
        store: Arc<TaskStore>,
        client: Arc<ApiClient>,
        engine: Arc<SyncEngine>,
        config: Arc<SyncConfig>,
    ) -> Arc<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            client,
            engine,
            config,
            notices,
            pending_deletes: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to user-visible notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Ids currently scheduled for deletion (for the view to hide).
    pub fn pending_delete_ids(&self) -> Vec<String> {
        self.pending_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Insert a new task locally and opportunistically create it remotely.
    ///
    /// A failed create is not rolled back: the task keeps its local id and
    /// stays dirty, and the next reconciliation pass retries it.
    pub async fn add_task(&self, task: Task) -> Result<(), SyncError> {
        let id = task.id.clone();
        self.store.update(
            move |draft| {
                let mut task = task;
                task.dirty = true;
                draft.entry(task.date_key()).or_default().push(task);
            },
            false,
        );

        if !self.client.is_authenticated() {
            return Ok(());
        }
        let Some(task) = self.store.find_task(&id) else {
            return Ok(());
        };
        let payload = crate::task::TaskPayload::from_task(&task);
        match self.client.create_task(&payload).await {
            Ok(created) => {
                let server_id = created.id;
                self.store.update(
                    |draft| {
                        for list in draft.values_mut() {
                            if let Some(t) = list.iter_mut().find(|t| t.id == id) {
                                t.id = server_id.to_string();
                                t.server_id = Some(server_id);
                                t.dirty = false;
                            }
                        }
                    },
                    true,
                );
                let _ = self.notices.send(Notice::Saved);
            }
            Err(err) => {
                tracing::warn!(error = %err, "create failed, task stays local until next reconcile");
            }
        }
        Ok(())
    }

    /// Flip a task's completed flag, pushing the single field remotely.
    pub async fn toggle_task(&self, id: &str) -> Result<(), SyncError> {
        if self.store.find_task(id).is_none() {
            return Err(SyncError::validation("id", "task not found"));
        }
        let snapshot = self.store.get();

        self.store.update(
            |draft| {
                for list in draft.values_mut() {
                    if let Some(task) = list.iter_mut().find(|t| t.id == id) {
                        task.completed = !task.completed;
                        task.dirty = true;
                        task.last_modified = now_millis();
                    }
                }
            },
            false,
        );

        if !self.client.is_authenticated() {
            return Ok(());
        }
        let Some(task) = self.store.find_task(id) else {
            return Ok(());
        };
        let diff = TaskDiff {
            completed: Some(task.completed),
            ..TaskDiff::default()
        };
        match self.push_single(&task, diff).await {
            Ok(()) => {
                // Success is silent; only failures surface to the user.
                self.clear_dirty(id);
                Ok(())
            }
            Err(err) => {
                self.rollback(snapshot);
                Err(err)
            }
        }
    }

    /// Apply a partial edit, pushing the changed fields remotely.
    pub async fn edit_task(&self, id: &str, edit: TaskEdit) -> Result<(), SyncError> {
        let Some(current) = self.store.find_task(id) else {
            return Err(SyncError::validation("id", "task not found"));
        };

        if let Some(title) = &edit.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(SyncError::validation("title", "must not be empty"));
            }
            if trimmed.chars().count() > MAX_TITLE_CHARS {
                return Err(SyncError::validation("title", "must be at most 500 characters"));
            }
        }
        if let Some(Some(date)) = &edit.date {
            if !is_valid_date(date) {
                return Err(SyncError::validation("date", "expected YYYY-MM-DD"));
            }
        }
        if let Some(Some(time)) = &edit.time {
            if !is_valid_time(time) {
                return Err(SyncError::validation("time", "expected HH:MM"));
            }
        }
        let final_date = match &edit.date {
            Some(d) => d.clone(),
            None => current.date.clone(),
        };
        if final_date.is_none() && matches!(&edit.time, Some(Some(_))) {
            return Err(SyncError::validation("time", "requires a date"));
        }

        let snapshot = self.store.get();
        let applied = edit.clone();
        self.store.update(
            |draft| {
                let mut moved = None;
                for list in draft.values_mut() {
                    if let Some(pos) = list.iter().position(|t| t.id == id) {
                        moved = Some(list.remove(pos));
                        break;
                    }
                }
                if let Some(mut task) = moved {
                    apply_edit(&mut task, &applied);
                    task.dirty = true;
                    task.last_modified = now_millis();
                    draft.entry(task.date_key()).or_default().push(task);
                }
            },
            false,
        );

        if !self.client.is_authenticated() {
            return Ok(());
        }
        let Some(task) = self.store.find_task(id) else {
            return Ok(());
        };
        match self.push_single(&task, diff_from_edit(&edit)).await {
            Ok(()) => {
                self.clear_dirty(id);
                Ok(())
            }
            Err(err) => {
                self.rollback(snapshot);
                Err(err)
            }
        }
    }

    /// Remove a task locally and delete it remotely, rolling back on failure.
    pub async fn delete_task_now(&self, id: &str) -> Result<(), SyncError> {
        let Some(task) = self.store.find_task(id) else {
            return Ok(());
        };
        let snapshot = self.store.get();

        self.store.update(
            |draft| {
                for list in draft.values_mut() {
                    list.retain(|t| t.id != id);
                }
            },
            false,
        );

        if !self.client.is_authenticated() {
            return Ok(());
        }
        let result = match task.resolved_server_id() {
            Some(server_id) => self.client.delete_task(server_id).await,
            // Never pushed; reconciliation will simply no longer see it.
            None => self.engine.reconcile().await.map(|_| ()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.rollback(snapshot);
                Err(err)
            }
        }
    }

    /// Schedule a deletion with a grace window for undo.
    ///
    /// The task stays in the store until the window elapses; the view hides
    /// it using [`pending_delete_ids`](Self::pending_delete_ids). Returns
    /// `false` when the task does not exist.
    pub fn schedule_delete(self: &Arc<Self>, id: &str) -> bool {
        let Some(task) = self.store.find_task(id) else {
            return false;
        };
        let grace = Duration::from_millis(self.config.undo_grace_ms);
        let task_id = id.to_string();

        {
            let mut pending = self
                .pending_deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = pending.insert(task_id.clone(), PendingDelete { timer: None }) {
                if let Some(timer) = previous.timer {
                    timer.abort();
                }
            }
        }

        let actions = Arc::clone(self);
        let commit_id = task_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let still_pending = actions
                .pending_deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&commit_id)
                .is_some();
            if still_pending {
                if let Err(err) = actions.delete_task_now(&commit_id).await {
                    tracing::warn!(error = %err, id = %commit_id, "deferred delete failed");
                }
            }
        });

        let mut pending = self
            .pending_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match pending.get_mut(&task_id) {
            Some(entry) => entry.timer = Some(timer),
            // Undone (or committed) between insert and spawn.
            None => timer.abort(),
        }
        drop(pending);

        let _ = self.notices.send(Notice::Deleted {
            id: task_id,
            title: task.title,
        });
        true
    }

    /// Cancel a scheduled deletion before its window elapses.
    ///
    /// The task was never removed, so no restore and no network call happen.
    pub fn undo_delete(&self, id: &str) -> bool {
        let removed = self
            .pending_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                let _ = self.notices.send(Notice::Restored);
                true
            }
            None => false,
        }
    }

    async fn push_single(&self, task: &Task, diff: TaskDiff) -> Result<(), SyncError> {
        match task.resolved_server_id() {
            Some(server_id) => {
                if diff.is_empty() {
                    return Ok(());
                }
                self.client.update_task(server_id, &diff).await.map(|_| ())
            }
            // No server id yet: fall back to a full reconciliation pass.
            None => self.engine.reconcile().await.map(|_| ()),
        }
    }

    fn clear_dirty(&self, id: &str) {
        self.store.update(
            |draft| {
                for list in draft.values_mut() {
                    if let Some(task) = list.iter_mut().find(|t| t.id == id) {
                        task.dirty = false;
                    }
                }
            },
            true,
        );
    }

    fn rollback(&self, snapshot: crate::task::TasksByDate) {
        self.store.set(snapshot, false);
        let _ = self.notices.send(Notice::Reverted {
            message: "change reverted".to_string(),
        });
    }
}

fn apply_edit(task: &mut Task, edit: &TaskEdit) {
    if let Some(title) = &edit.title {
        task.title = title.trim().to_string();
    }
    if let Some(description) = &edit.description {
        task.description = description.clone();
    }
    if let Some(date) = &edit.date {
        task.date = date.clone();
    }
    if let Some(time) = &edit.time {
        task.time = time.clone();
    }
    if let Some(completed) = edit.completed {
        task.completed = completed;
    }
    if let Some(is_reminder) = edit.is_reminder {
        task.is_reminder = is_reminder;
    }
    if let Some(priority) = edit.priority {
        task.priority = priority;
    }
    if let Some(tags) = &edit.tags {
        task.tags = tags.clone();
    }
    if task.date.is_none() {
        task.time = None;
    }
}

/// The wire diff carries only the fields the edit touched. `time` is local
/// presentation state and is not part of the update contract.
fn diff_from_edit(edit: &TaskEdit) -> TaskDiff {
    TaskDiff {
        title: edit.title.clone().map(|t| t.trim().to_string()),
        description: edit
            .description
            .clone()
            .map(|d| if d.is_empty() { None } else { Some(d) }),
        date: edit.date.clone(),
        completed: edit.completed,
        is_reminder: edit.is_reminder,
        priority: edit.priority.map(u8::from),
        tags: edit.tags.clone(),
    }
}
