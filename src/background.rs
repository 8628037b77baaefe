//! Background sync service.
//!
//! Runs periodic sync passes while a session is active: push local changes
//! via reconciliation first, then refresh the store from the remote set, so
//! unsynced local edits are never overwritten by the pull. Failures back off
//! by doubling the interval up to a ceiling and are logged, never surfaced
//! as user notices; they self-heal on a later pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reconcile::SyncEngine;

/// Owns the background sync loop.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    config: Arc<SyncConfig>,
    handle: Option<JoinHandle<()>>,
}

impl SyncService {
    pub fn new(engine: Arc<SyncEngine>, config: Arc<SyncConfig>) -> Self {
        Self {
            engine,
            config,
            handle: None,
        }
    }

    /// Start the periodic loop; a no-op when already running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let engine = Arc::clone(&self.engine);
        let base = Duration::from_millis(self.config.base_sync_interval_ms);
        let max = Duration::from_millis(self.config.max_sync_interval_ms);

        self.handle = Some(tokio::spawn(async move {
            let mut interval = base;
            loop {
                tokio::time::sleep(interval).await;
                match sync_once(&engine).await {
                    Ok(()) => interval = base,
                    Err(err) => {
                        interval = (interval * 2).min(max);
                        tracing::warn!(
                            error = %err,
                            next_attempt_ms = interval.as_millis() as u64,
                            "background sync failed, backing off"
                        );
                    }
                }
            }
        }));
        tracing::info!("background sync started");
    }

    /// Stop the loop; in-flight requests run to completion server-side.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!("background sync stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sync_once(engine: &SyncEngine) -> Result<(), SyncError> {
    engine.reconcile().await?;
    engine.refresh_from_remote().await?;
    Ok(())
}
