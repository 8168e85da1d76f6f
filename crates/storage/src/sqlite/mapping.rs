use chrono::{DateTime, Utc};
use course_core::model::{ChallengeId, UserProgress};
use sqlx::Row;
use sqlx::error::ErrorKind;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors: decoding problems and constraint violations are
/// permanent, everything else is treated as a (retryable) connection problem.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => ser(e),
        sqlx::Error::Database(ref db) if !matches!(db.kind(), ErrorKind::Other) => {
            StorageError::Backend(e.to_string())
        }
        other => StorageError::Connection(other.to_string()),
    }
}

pub(crate) fn version_to_i64(version: u64) -> Result<i64, StorageError> {
    i64::try_from(version).map_err(|_| StorageError::Serialization("version overflow".into()))
}

pub(crate) fn version_from_i64(v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization("version sign overflow".into()))
}

pub(crate) fn challenge_id_from_str(raw: String) -> Result<ChallengeId, StorageError> {
    ChallengeId::new(raw.clone())
        .map_err(|_| StorageError::Serialization(format!("invalid challenge id: {raw:?}")))
}

/// Builds a `UserProgress` from a `user_progress` row plus its completed ids.
pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
    completed: Vec<String>,
) -> Result<(UserProgress, u64), StorageError> {
    let current = challenge_id_from_str(row.try_get("current_challenge").map_err(ser)?)?;
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    let last_activity: DateTime<Utc> = row.try_get("last_activity").map_err(ser)?;
    let version = version_from_i64(row.try_get::<i64, _>("version").map_err(ser)?)?;

    let completed = completed
        .into_iter()
        .map(challenge_id_from_str)
        .collect::<Result<Vec<_>, _>>()?;

    let progress = UserProgress::from_persisted(completed, current, started_at, last_activity)
        .map_err(ser)?;
    Ok((progress, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn constraint_violations_are_not_retryable() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER NOT NULL CHECK (v >= 1))")
            .execute(&pool)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO t (v) VALUES (0)")
            .execute(&pool)
            .await
            .unwrap_err();
        let mapped = db_err(err);
        assert!(matches!(mapped, StorageError::Backend(_)), "{mapped}");
        assert!(!mapped.is_transient());
    }

    #[test]
    fn negative_versions_are_rejected() {
        assert!(matches!(
            version_from_i64(-1),
            Err(StorageError::Serialization(_))
        ));
        assert_eq!(version_from_i64(3).unwrap(), 3);
    }
}
