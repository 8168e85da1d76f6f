//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::ProgressError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressStore`.
///
/// A failed mutation leaves the store's in-memory record as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressStoreError {
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// The repository could not be read or written within the retry budget.
    /// Running out of conflict retries reports a `Conflict` source.
    #[error("persisting progress failed after {attempts} attempt(s): {source}")]
    PersistenceFailure {
        attempts: u32,
        #[source]
        source: StorageError,
    },
}

impl ProgressStoreError {
    /// Whether the failure was a lost compare-and-swap race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure {
                source: StorageError::Conflict,
                ..
            }
        )
    }
}

/// Errors emitted while bootstrapping course services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
