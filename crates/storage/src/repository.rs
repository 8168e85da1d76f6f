use async_trait::async_trait;
use course_core::model::{LearnerId, UserProgress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The stored version no longer matches the caller's expectation.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The backend refused the operation in a way retrying cannot fix
    /// (constraint violations, a poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

/// A learner's record together with its compare-and-swap version.
///
/// Versions start at 1 and grow by one with every successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProgress {
    pub progress: UserProgress,
    pub version: u64,
}

/// Repository contract for learner progress records.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for `learner`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load(&self, learner: LearnerId) -> Result<Option<StoredProgress>, StorageError>;

    /// Write `progress` and return the new version.
    ///
    /// With `expected_version == None` the record must not exist yet; with
    /// `Some(v)` the stored version must still be `v`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the expectation does not hold,
    /// or other storage errors.
    async fn save(
        &self,
        learner: LearnerId,
        progress: &UserProgress,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<HashMap<LearnerId, StoredProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load(&self, learner: LearnerId) -> Result<Option<StoredProgress>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(guard.get(&learner).cloned())
    }

    async fn save(
        &self,
        learner: LearnerId,
        progress: &UserProgress,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let current = guard.get(&learner).map(|stored| stored.version);
        if current != expected_version {
            return Err(StorageError::Conflict);
        }

        let version = current.map_or(1, |v| v + 1);
        guard.insert(
            learner,
            StoredProgress {
                progress: progress.clone(),
                version,
            },
        );
        Ok(version)
    }
}

/// Bundles the progress repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
