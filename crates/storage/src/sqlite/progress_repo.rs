use course_core::model::{LearnerId, UserProgress};

use super::SqliteRepository;
use super::mapping::{db_err, map_progress_row, version_to_i64};
use crate::repository::{ProgressRepository, StorageError, StoredProgress};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load(&self, learner: LearnerId) -> Result<Option<StoredProgress>, StorageError> {
        let learner_key = learner.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            r"
            SELECT current_challenge, started_at, last_activity, version
            FROM user_progress WHERE learner_id = ?1
            ",
        )
        .bind(&learner_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let completed: Vec<String> = sqlx::query_scalar(
            r"
            SELECT challenge_id FROM completed_challenges
            WHERE learner_id = ?1
            ORDER BY challenge_id ASC
            ",
        )
        .bind(&learner_key)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let (progress, version) = map_progress_row(&row, completed)?;
        Ok(Some(StoredProgress { progress, version }))
    }

    async fn save(
        &self,
        learner: LearnerId,
        progress: &UserProgress,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let learner_key = learner.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let new_version = match expected_version {
            None => {
                let res = sqlx::query(
                    r"
                    INSERT INTO user_progress (learner_id, current_challenge, started_at, last_activity, version)
                    VALUES (?1, ?2, ?3, ?4, 1)
                    ON CONFLICT(learner_id) DO NOTHING
                    ",
                )
                .bind(&learner_key)
                .bind(progress.current_challenge().as_str())
                .bind(progress.started_at())
                .bind(progress.last_activity())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

                if res.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
                1
            }
            Some(expected) => {
                let next = expected
                    .checked_add(1)
                    .ok_or_else(|| StorageError::Serialization("version overflow".into()))?;
                let res = sqlx::query(
                    r"
                    UPDATE user_progress
                    SET current_challenge = ?2,
                        started_at = ?3,
                        last_activity = ?4,
                        version = ?5
                    WHERE learner_id = ?1 AND version = ?6
                    ",
                )
                .bind(&learner_key)
                .bind(progress.current_challenge().as_str())
                .bind(progress.started_at())
                .bind(progress.last_activity())
                .bind(version_to_i64(next)?)
                .bind(version_to_i64(expected)?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

                if res.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
                next
            }
        };

        // The row is rewritten as a whole so the stored set matches `progress` exactly.
        sqlx::query("DELETE FROM completed_challenges WHERE learner_id = ?1")
            .bind(&learner_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for id in progress.completed_challenges() {
            sqlx::query(
                r"
                INSERT INTO completed_challenges (learner_id, challenge_id)
                VALUES (?1, ?2)
                ",
            )
            .bind(&learner_key)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(learner = %learner, version = new_version, "saved progress");
        Ok(new_version)
    }
}
