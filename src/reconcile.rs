//! Reconciliation engine.
//!
//! Converges the remote store toward the local task set with the minimal set
//! of creates and updates, relinking locally generated ids to server-issued
//! ones. Remote tasks with no local counterpart are left untouched; explicit
//! deletes propagate through the action layer instead (see DESIGN.md for the
//! variant decision).
//!
//! A pass is idempotent: once every local task carries a server id, an
//! immediate second pass matches everything by id, produces empty diffs, and
//! issues zero writes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::ApiClient;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::pagination::fetch_all_tasks;
use crate::store::TaskStore;
use crate::task::{flatten_tasks, ApiTask, TaskDiff, TaskPayload, TasksByDate};

/// Outcome counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub relinked: usize,
    pub failed: usize,
}

/// The sync engine: full refresh from remote plus the push reconciliation.
pub struct SyncEngine {
    client: Arc<ApiClient>,
    store: Arc<TaskStore>,
    config: Arc<SyncConfig>,
    /// Serializes reconciliation passes; concurrent passes would duplicate
    /// creates for the same local task.
    gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(client: Arc<ApiClient>, store: Arc<TaskStore>, config: Arc<SyncConfig>) -> Self {
        Self {
            client,
            store,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Replace the local store with the remote task set.
    ///
    /// Local-only tasks (never pushed, unknown to the backend) are preserved
    /// and re-marked dirty so the next reconciliation pushes them. Returns
    /// `false` without touching anything when no session is active.
    pub async fn refresh_from_remote(&self) -> Result<bool, SyncError> {
        if !self.client.is_authenticated() {
            return Ok(false);
        }

        let remote = fetch_all_tasks(&self.client, self.config.page_size).await?;
        tracing::info!(count = remote.len(), "loaded remote tasks");

        let mut backend_ids: HashSet<String> = HashSet::new();
        let mut by_date = TasksByDate::new();
        for api_task in remote {
            backend_ids.insert(api_task.id.to_string());
            let task = api_task.into_task();
            by_date.entry(task.date_key()).or_default().push(task);
        }

        let local = self.store.get();
        let mut preserved = 0;
        for (date_key, list) in &local {
            for task in list {
                if task.has_local_id() && !backend_ids.contains(&task.id) {
                    let mut task = task.clone();
                    task.dirty = true;
                    by_date.entry(date_key.clone()).or_default().push(task);
                    preserved += 1;
                }
            }
        }
        if preserved > 0 {
            tracing::info!(preserved, "kept local-only tasks not on the backend");
        }

        self.store.set(by_date, false);
        Ok(true)
    }

    /// One reconciliation pass: create or update every local task remotely,
    /// then relink local ids to server ids in a single store update.
    ///
    /// A single task's failure never aborts the pass; failed creates keep
    /// their local id and are retried on the next pass.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, SyncError> {
        if !self.client.is_authenticated() {
            return Ok(ReconcileSummary::default());
        }
        let _pass = self.gate.lock().await;

        let remote = fetch_all_tasks(&self.client, self.config.page_size).await?;

        let by_id: HashMap<i64, ApiTask> = remote.iter().map(|t| (t.id, t.clone())).collect();
        // FIFO queues so two remote tasks sharing a signature are each
        // consumed at most once.
        let mut by_signature: HashMap<String, VecDeque<ApiTask>> = HashMap::new();
        for task in &remote {
            by_signature
                .entry(task.signature())
                .or_default()
                .push_back(task.clone());
        }

        let locals = flatten_tasks(&self.store.get());
        let mut relinks: Vec<(String, i64)> = Vec::new();
        let mut summary = ReconcileSummary::default();

        for local in locals {
            let mut matched = local
                .server_id
                .and_then(|id| by_id.get(&id))
                .cloned();
            if matched.is_none() {
                if let Some(numeric) = local.numeric_id() {
                    matched = by_id.get(&numeric).cloned();
                }
            }
            if matched.is_none() {
                if let Some(queue) = by_signature.get_mut(&local.signature()) {
                    if let Some(candidate) = queue.pop_front() {
                        if candidate.id.to_string() != local.id {
                            relinks.push((local.id.clone(), candidate.id));
                        }
                        matched = Some(candidate);
                    }
                }
            }

            match matched {
                None => {
                    let payload = TaskPayload::from_task(&local);
                    match self.client.create_task(&payload).await {
                        Ok(created) => {
                            relinks.push((local.id.clone(), created.id));
                            summary.created += 1;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, title = %local.title, "create failed, will retry next pass");
                            summary.failed += 1;
                        }
                    }
                }
                Some(remote_task) => {
                    let diff = TaskDiff::between(&local, &remote_task);
                    if diff.is_empty() {
                        continue;
                    }
                    match self.client.update_task(remote_task.id, &diff).await {
                        Ok(_) => summary.updated += 1,
                        Err(err) => {
                            tracing::warn!(error = %err, server_id = remote_task.id, "update failed");
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        if !relinks.is_empty() {
            summary.relinked = relinks.len();
            // One batch update, one change notification.
            self.store.update(
                |draft| {
                    for list in draft.values_mut() {
                        for task in list.iter_mut() {
                            if let Some((_, server_id)) =
                                relinks.iter().find(|(local_id, _)| *local_id == task.id)
                            {
                                task.id = server_id.to_string();
                                task.server_id = Some(*server_id);
                                task.dirty = false;
                            }
                        }
                    }
                },
                false,
            );
        }

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            relinked = summary.relinked,
            failed = summary.failed,
            "reconciliation pass complete"
        );
        Ok(summary)
    }
}
