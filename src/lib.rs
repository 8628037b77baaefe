//! # taskcal-sync
//!
//! Client-side synchronization engine for an offline-first task-and-calendar
//! application. Reconciles a local task cache with a remote authoritative
//! store over an unreliable network without losing data, duplicating records,
//! or making the user wait.
//!
//! ## Architecture
//!
//! - **[`client`]**: resilient HTTP client with bounded retries on transient
//!   failures (transport errors, HTTP 502/503)
//! - **[`pagination`]**: retrieves the complete remote task set defensively,
//!   even against a backend that does not paginate correctly
//! - **[`store`]**: copy-on-write local task cache with synchronous
//!   persistence and a change-event channel for the view layer
//! - **[`reconcile`]**: converges local and remote task sets with minimal
//!   writes, relinking local ids to server-issued ones
//! - **[`actions`]**: optimistic single-task mutations with wholesale
//!   rollback and deferred-commit undo for deletion
//! - **[`background`]**: periodic sync loop with failure backoff
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskcal_sync::{
//!     actions::TaskActions, client::ApiClient, config::SyncConfig,
//!     reconcile::SyncEngine, storage::JsonFileStorage, store::TaskStore,
//! };
//!
//! let config = Arc::new(SyncConfig::new());
//! let client = Arc::new(ApiClient::new(config.clone()));
//! let store = Arc::new(TaskStore::new(Arc::new(JsonFileStorage::in_user_data_dir())));
//! let engine = Arc::new(SyncEngine::new(client.clone(), store.clone(), config.clone()));
//! let actions = TaskActions::new(store.clone(), client.clone(), engine.clone(), config);
//!
//! // After login:
//! client.set_token("jwt");
//! ```

pub mod actions;
pub mod background;
pub mod client;
pub mod config;
pub mod error;
pub mod pagination;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod task;

pub use actions::{Notice, TaskActions, TaskEdit};
pub use background::SyncService;
pub use client::ApiClient;
pub use config::SyncConfig;
pub use error::SyncError;
pub use reconcile::{ReconcileSummary, SyncEngine};
pub use storage::{BlobStorage, JsonFileStorage, MemoryStorage};
pub use store::{StoreEvent, TaskStore};
pub use task::{ApiTask, Priority, Task, TasksByDate};
