//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use taskcal_sync::actions::TaskActions;
use taskcal_sync::client::ApiClient;
use taskcal_sync::config::SyncConfig;
use taskcal_sync::reconcile::SyncEngine;
use taskcal_sync::storage::MemoryStorage;
use taskcal_sync::store::TaskStore;
use taskcal_sync::task::{Task, TasksByDate};

/// Config pointing at a test backend, with short delays so retry and undo
/// tests run quickly.
pub fn test_config(base_url: &str) -> SyncConfig {
    let mut config = SyncConfig::with_base_url(base_url);
    config.retry_base_delay_ms = 5;
    config.undo_grace_ms = 100;
    config
}

/// A fully wired engine against an in-memory store, authenticated.
pub struct Harness {
    pub config: Arc<SyncConfig>,
    pub client: Arc<ApiClient>,
    pub store: Arc<TaskStore>,
    pub engine: Arc<SyncEngine>,
    pub actions: Arc<TaskActions>,
}

pub fn harness(base_url: &str) -> Harness {
    harness_with_config(test_config(base_url))
}

pub fn harness_with_config(config: SyncConfig) -> Harness {
    let config = Arc::new(config);
    let client = Arc::new(ApiClient::new(config.clone()));
    client.set_token("test-token");
    let store = Arc::new(TaskStore::new(Arc::new(MemoryStorage::new())));
    let engine = Arc::new(SyncEngine::new(
        client.clone(),
        store.clone(),
        config.clone(),
    ));
    let actions = TaskActions::new(store.clone(), client.clone(), engine.clone(), config.clone());
    Harness {
        config,
        client,
        store,
        engine,
        actions,
    }
}

/// Seed the store with tasks, silently.
pub fn seed(store: &TaskStore, tasks: Vec<Task>) {
    store.update(
        move |draft: &mut TasksByDate| {
            for task in tasks {
                draft.entry(task.date_key()).or_default().push(task);
            }
        },
        true,
    );
}

/// A local, never-synced task marked dirty.
pub fn local_task(title: &str, date: Option<&str>) -> Task {
    Task::new(title, date.map(str::to_string), None)
}

/// Wire-shaped task body for mock responses.
pub fn api_task_json(id: i64, title: &str, date: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "id": id,
        "title": title,
        "completed": false,
        "is_reminder": true,
        "priority": 1,
        "tags": []
    });
    if let Some(date) = date {
        body["date"] = json!(date);
    }
    body
}

/// TCP listener that accepts and immediately closes every connection,
/// counting accepts. Lets tests assert the exact number of transport
/// attempts the client makes when the backend is unreachable.
pub struct ClosingListener {
    pub url: String,
    accepted: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl ClosingListener {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        drop(stream);
                    }
                    Err(_) => break,
                }
            }
        });
        Self {
            url: format!("http://{addr}"),
            accepted,
            handle,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for ClosingListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
