//! Resilient HTTP client for the task backend.
//!
//! One logical request maps to a bounded attempt loop. Transport failures and
//! HTTP 502/503 are retried with linear backoff (base delay multiplied by the
//! attempt number); every other response is returned as-is for the caller to
//! classify. A bearer credential is attached whenever a session token is
//! installed; without a token the rest of the engine treats sync as a no-op.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::task::{ApiTask, ApiTaskEnvelope, TaskDiff, TaskListResponse, TaskPayload};

/// HTTP client with retry and session-token handling.
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<SyncConfig>,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: Arc<SyncConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    /// Install the session token used for the bearer header.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Drop the session token (logout).
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a session token is installed.
    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Issue a request with the configured attempt cap.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, SyncError> {
        self.request_with_attempts(method, path, body, self.config.max_attempts)
            .await
    }

    /// Issue a request with an explicit attempt cap.
    ///
    /// Returns the final response even when it is a non-2xx status; only
    /// transport failures on the last attempt become errors.
    pub async fn request_with_attempts(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        max_attempts: u32,
    ) -> Result<Response, SyncError> {
        let max_attempts = max_attempts.max(1);
        let url = self.config.api_url(path);

        for attempt in 1..=max_attempts {
            let mut request = self.http.request(method.clone(), &url);
            if let Some(token) = self.bearer() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let transient = status == StatusCode::BAD_GATEWAY
                        || status == StatusCode::SERVICE_UNAVAILABLE;
                    if transient && attempt < max_attempts {
                        tracing::debug!(%status, attempt, %url, "transient status, retrying");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt < max_attempts {
                        tracing::debug!(error = %err, attempt, %url, "transport error, retrying");
                        self.backoff(attempt).await;
                        continue;
                    }
                    tracing::warn!(error = %err, attempts = max_attempts, %url, "request failed, retries exhausted");
                    return Err(SyncError::retries_exhausted(max_attempts, err));
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts: max_attempts,
            source: None,
        })
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.retry_base_delay_ms.saturating_mul(attempt as u64);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// `GET /api/tasks?limit=&offset=`: one page of remote tasks.
    pub async fn list_tasks(&self, limit: usize, offset: usize) -> Result<Vec<ApiTask>, SyncError> {
        let path = format!("/api/tasks?limit={limit}&offset={offset}");
        let response = self.request(Method::GET, &path, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http { status });
        }
        let body: TaskListResponse = response.json().await?;
        Ok(body.data)
    }

    /// `POST /api/tasks`: create a task, returning the server-issued record.
    pub async fn create_task(&self, payload: &TaskPayload) -> Result<ApiTask, SyncError> {
        let body = serde_json::to_value(payload)?;
        let response = self.request(Method::POST, "/api/tasks", Some(body)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http { status });
        }
        let envelope: ApiTaskEnvelope = response.json().await?;
        Ok(envelope.into_inner())
    }

    /// `PUT /api/tasks/:id`: apply a partial diff.
    pub async fn update_task(&self, server_id: i64, diff: &TaskDiff) -> Result<ApiTask, SyncError> {
        let body = serde_json::to_value(diff)?;
        let path = format!("/api/tasks/{server_id}");
        let response = self.request(Method::PUT, &path, Some(body)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http { status });
        }
        let envelope: ApiTaskEnvelope = response.json().await?;
        Ok(envelope.into_inner())
    }

    /// `DELETE /api/tasks/:id`.
    pub async fn delete_task(&self, server_id: i64) -> Result<(), SyncError> {
        let path = format!("/api/tasks/{server_id}");
        let response = self.request(Method::DELETE, &path, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http { status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_token_lifecycle() {
        let client = ApiClient::new(Arc::new(SyncConfig::with_base_url("http://example.test")));
        assert!(!client.is_authenticated());
        client.set_token("jwt-token");
        assert!(client.is_authenticated());
        client.clear_token();
        assert!(!client.is_authenticated());
    }
}
