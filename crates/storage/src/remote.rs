//! Progress repository backed by a remote HTTP service.
//!
//! Wire contract:
//! - `GET  {base}/progress/{learner}` → `200 {"progress": …, "version": n}` or `404`
//! - `PUT  {base}/progress/{learner}` with `{"progress": …, "expectedVersion": n|null}`
//!   → `200 {"version": n}` or `409` when the expectation is stale
//!
//! `401`/`403` map to `Unauthorized`, `429` and `5xx` (and transport failures)
//! to the retryable `Connection`, anything else to `Rejected`.

use std::time::Duration;

use async_trait::async_trait;
use course_core::model::{LearnerId, UserProgress};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::repository::{ProgressRepository, Storage, StorageError, StoredProgress};

/// Connection settings for the remote progress service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct HttpProgressRepository {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpProgressRepository {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be constructed.
    pub fn new(config: RemoteConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    fn record_url(&self, learner: LearnerId) -> String {
        format!("{}/progress/{learner}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    progress: &'a UserProgress,
    expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    version: u64,
}

fn transport(e: reqwest::Error) -> StorageError {
    if e.is_decode() {
        StorageError::Serialization(e.to_string())
    } else {
        StorageError::Connection(e.to_string())
    }
}

async fn status_error(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    match status {
        StatusCode::CONFLICT => StorageError::Conflict,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => StorageError::Connection(format!("{status}: {message}")),
        s if s.is_server_error() => StorageError::Connection(format!("{status}: {message}")),
        s => StorageError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ProgressRepository for HttpProgressRepository {
    async fn load(&self, learner: LearnerId) -> Result<Option<StoredProgress>, StorageError> {
        let response = self
            .authorize(self.client.get(self.record_url(learner)))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let stored: StoredProgress = response.json().await.map_err(transport)?;
        Ok(Some(stored))
    }

    async fn save(
        &self,
        learner: LearnerId,
        progress: &UserProgress,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let body = SaveRequest {
            progress,
            expected_version,
        };
        let response = self
            .authorize(self.client.put(self.record_url(learner)))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let saved: SaveResponse = response.json().await.map_err(transport)?;
        tracing::debug!(learner = %learner, version = saved.version, "saved progress remotely");
        Ok(saved.version)
    }
}

impl Storage {
    /// Build a `Storage` backed by the remote progress service.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the HTTP client cannot be constructed.
    pub fn remote(config: RemoteConfig) -> Result<Self, StorageError> {
        let repo = HttpProgressRepository::new(config)?;
        Ok(Self {
            progress: std::sync::Arc::new(repo),
        })
    }
}
