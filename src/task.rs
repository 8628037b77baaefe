//! Canonical task model and wire-shape normalization.
//!
//! The engine keeps exactly one task shape in memory ([`Task`]); every
//! ambiguous representation from the outside world (numeric-or-string ids,
//! int-or-text priorities, timestamp dates) is converted at the boundary:
//! [`ApiTask::into_task`] for remote responses and the store's load path for
//! legacy persisted blobs. Ambiguous shapes never propagate past these points.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Date key used for tasks without a date.
pub const UNDATED_KEY: &str = "undated";

/// Prefix of locally generated task ids.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Tasks grouped by date key (`YYYY-MM-DD` or [`UNDATED_KEY`]).
///
/// The store guarantees that no key maps to an empty list.
pub type TasksByDate = BTreeMap<String, Vec<Task>>;

/// Task priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PriorityRepr", into = "u8")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::High
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

/// Priority as it may appear on the wire or in legacy persisted blobs:
/// an integer 1-3 or one of the enumerated strings `alta`/`media`/`baja`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriorityRepr {
    Number(i64),
    Text(String),
}

impl From<PriorityRepr> for Priority {
    fn from(repr: PriorityRepr) -> Self {
        match repr {
            PriorityRepr::Number(1) => Priority::High,
            PriorityRepr::Number(2) => Priority::Medium,
            PriorityRepr::Number(3) => Priority::Low,
            PriorityRepr::Text(ref s) if s == "alta" => Priority::High,
            PriorityRepr::Text(ref s) if s == "media" => Priority::Medium,
            PriorityRepr::Text(ref s) if s == "baja" => Priority::Low,
            _ => Priority::High,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The canonical local unit of work.
///
/// Serialized in camelCase so persisted blobs from earlier client versions
/// load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Locally stable identifier: a stringified server id or a generated
    /// `local_<timestamp>_<random>` id.
    pub id: String,
    /// Authoritative remote identifier once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD` or `None` for undated tasks.
    #[serde(default)]
    pub date: Option<String>,
    /// `HH:MM`; always `None` when `date` is `None`.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_true")]
    pub is_reminder: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    /// True while a local mutation has not been confirmed by the remote.
    #[serde(default)]
    pub dirty: bool,
    /// Advisory last-modification timestamp (unix millis).
    #[serde(default)]
    pub last_modified: i64,
}

impl Task {
    /// Create a new local task with a generated id, marked dirty.
    pub fn new(title: impl Into<String>, date: Option<String>, time: Option<String>) -> Self {
        let date = date.filter(|d| is_valid_date(d));
        let time = if date.is_some() { time } else { None };
        Self {
            id: generate_local_id(),
            server_id: None,
            title: title.into(),
            description: String::new(),
            date,
            time,
            completed: false,
            is_reminder: true,
            priority: Priority::default(),
            tags: Vec::new(),
            dirty: true,
            last_modified: now_millis(),
        }
    }

    /// Date key this task belongs under.
    pub fn date_key(&self) -> String {
        match self.date.as_deref() {
            Some(d) if !d.is_empty() && d != UNDATED_KEY => d.to_string(),
            _ => UNDATED_KEY.to_string(),
        }
    }

    /// The id as a server id, when it is a purely numeric string (legacy
    /// shape where the local id equals the server id).
    pub fn numeric_id(&self) -> Option<i64> {
        if !self.id.is_empty() && self.id.bytes().all(|b| b.is_ascii_digit()) {
            self.id.parse().ok()
        } else {
            None
        }
    }

    /// Best-effort server id: the explicit field, else a numeric local id.
    pub fn resolved_server_id(&self) -> Option<i64> {
        self.server_id.or_else(|| self.numeric_id())
    }

    /// Whether the id was generated locally and has never been relinked.
    ///
    /// Covers the canonical `local_` prefix and the legacy shape where local
    /// ids were bare millisecond timestamps (13+ digits).
    pub fn has_local_id(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
            || (self.id.len() >= 13 && self.id.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Derived matching key used when no identifier-based match exists.
    pub fn signature(&self) -> String {
        build_signature(
            &self.title,
            &self.description,
            self.date.as_deref(),
            self.time.as_deref(),
        )
    }
}

/// Generate a `local_<timestamp>_<random>` task id.
pub fn generate_local_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", LOCAL_ID_PREFIX, now_millis(), &random[..8])
}

/// Current unix time in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Strict `YYYY-MM-DD` check.
pub fn is_valid_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Strict `HH:MM` check.
pub fn is_valid_time(s: &str) -> bool {
    s.len() == 5 && NaiveTime::parse_from_str(s, "%H:%M").is_ok()
}

fn build_signature(
    title: &str,
    description: &str,
    date: Option<&str>,
    time: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}|{}",
        title.trim().to_lowercase(),
        description.trim().to_lowercase(),
        date.unwrap_or(""),
        time.unwrap_or("")
    )
}

/// Flatten the date map into a task list, with each task's `date` rewritten
/// from the key it was filed under.
pub fn flatten_tasks(tasks: &TasksByDate) -> Vec<Task> {
    let mut out = Vec::new();
    for (key, list) in tasks {
        let date = if key == UNDATED_KEY {
            None
        } else {
            Some(key.clone())
        };
        for task in list {
            let mut task = task.clone();
            task.date = date.clone();
            out.push(task);
        }
    }
    out
}

/// Remote wire shape of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTask {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// May be a bare date or a full timestamp; only the first ten characters
    /// are meaningful.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub is_reminder: Option<bool>,
    #[serde(default)]
    pub priority: Option<PriorityRepr>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ApiTask {
    /// Date key for this task, truncating timestamp-shaped dates.
    pub fn date_key(&self) -> String {
        match self.date.as_deref() {
            Some(d) if !d.is_empty() => {
                let end = d.char_indices().nth(10).map(|(i, _)| i).unwrap_or(d.len());
                d[..end].to_string()
            }
            _ => UNDATED_KEY.to_string(),
        }
    }

    /// Priority normalized to the canonical enum.
    pub fn normalized_priority(&self) -> Priority {
        self.priority.clone().map(Priority::from).unwrap_or_default()
    }

    /// Matching signature, on the same normalization as [`Task::signature`].
    pub fn signature(&self) -> String {
        let key = self.date_key();
        let date = if key == UNDATED_KEY {
            None
        } else {
            Some(key.as_str())
        };
        build_signature(
            &self.title,
            self.description.as_deref().unwrap_or(""),
            date,
            self.time.as_deref(),
        )
    }

    /// Convert into the canonical local shape.
    pub fn into_task(self) -> Task {
        let key = self.date_key();
        let date = if key == UNDATED_KEY { None } else { Some(key) };
        Task {
            id: self.id.to_string(),
            server_id: Some(self.id),
            title: self.title,
            description: self.description.unwrap_or_default(),
            time: if date.is_some() { self.time } else { None },
            date,
            completed: self.completed,
            is_reminder: self.is_reminder.unwrap_or(true),
            priority: self.priority.map(Priority::from).unwrap_or_default(),
            tags: self.tags,
            dirty: false,
            last_modified: 0,
        }
    }
}

/// Create responses arrive either bare or wrapped as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiTaskEnvelope {
    Wrapped { data: ApiTask },
    Plain(ApiTask),
}

impl ApiTaskEnvelope {
    pub fn into_inner(self) -> ApiTask {
        match self {
            Self::Wrapped { data } => data,
            Self::Plain(task) => task,
        }
    }
}

/// Body of `GET /api/tasks`.
#[derive(Debug, Deserialize)]
pub struct TaskListResponse {
    #[serde(default)]
    pub data: Vec<ApiTask>,
}

/// Body of `POST /api/tasks`.
///
/// `description`, `date`, and `time` are omitted entirely when absent or
/// invalid; the backend rejects empty-string date/time values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPayload {
    pub title: String,
    pub completed: bool,
    pub is_reminder: bool,
    pub priority: u8,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl TaskPayload {
    pub fn from_task(task: &Task) -> Self {
        let description = {
            let trimmed = task.description.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        let mut date = None;
        let mut time = None;
        if let Some(d) = task.date.as_deref().map(str::trim) {
            if d != UNDATED_KEY && is_valid_date(d) {
                date = Some(d.to_string());
                if let Some(t) = task.time.as_deref().map(str::trim) {
                    if !t.is_empty() {
                        time = Some(t.to_string());
                    }
                }
            }
        }
        Self {
            title: task.title.clone(),
            completed: task.completed,
            is_reminder: task.is_reminder,
            priority: task.priority.into(),
            tags: task.tags.clone(),
            description,
            date,
            time,
        }
    }
}

/// Partial body of `PUT /api/tasks/:id`.
///
/// `description` and `date` are double-optional: the outer `None` means
/// "unchanged, omit from the body", the inner `None` serializes as an
/// explicit JSON `null` that clears the field remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reminder: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TaskDiff {
    /// Field-level diff between a local task and its matched remote task.
    pub fn between(local: &Task, remote: &ApiTask) -> Self {
        let mut diff = Self::default();

        if remote.title != local.title {
            diff.title = Some(local.title.clone());
        }

        let remote_description = remote.description.as_deref().unwrap_or("");
        if remote_description != local.description {
            diff.description = Some(if local.description.is_empty() {
                None
            } else {
                Some(local.description.clone())
            });
        }

        let remote_key = remote.date_key();
        let remote_date = if remote_key == UNDATED_KEY {
            None
        } else {
            Some(remote_key)
        };
        let local_date = local
            .date
            .clone()
            .filter(|d| !d.is_empty() && d != UNDATED_KEY);
        if remote_date != local_date {
            diff.date = Some(local_date);
        }

        if remote.completed != local.completed {
            diff.completed = Some(local.completed);
        }

        if remote.is_reminder.unwrap_or(true) != local.is_reminder {
            diff.is_reminder = Some(local.is_reminder);
        }

        if remote.normalized_priority() != local.priority {
            diff.priority = Some(local.priority.into());
        }

        if remote.tags != local.tags {
            diff.tags = Some(local.tags.clone());
        }

        diff
    }

    /// True when no field changed; callers skip the network call entirely.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.completed.is_none()
            && self.is_reminder.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
    }
}
