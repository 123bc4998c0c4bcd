use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_core::model::{CategoryId, ProgressKey, ProgressRecord, Score, StageProgress, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_progress_record_row, map_progress_row, user_id_text};
use crate::repository::{StorageError, UserProgressRepository};

#[async_trait]
impl UserProgressRepository for SqliteRepository {
    async fn get_user_progress(
        &self,
        user_id: UserId,
        key: ProgressKey,
    ) -> Result<Option<StageProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT is_unlocked, highest_score
            FROM user_stage_progress
            WHERE user_id = ?1 AND category_id = ?2 AND stage_number = ?3
            ",
        )
        .bind(user_id_text(user_id))
        .bind(id_i64("category_id", key.category_id.value())?)
        .bind(i64::from(key.stage_number.value()))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_user_progress(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT category_id, stage_number, is_unlocked, highest_score
            FROM user_stage_progress
            WHERE user_id = ?1 AND category_id = ?2
            ORDER BY stage_number ASC
            ",
        )
        .bind(user_id_text(user_id))
        .bind(id_i64("category_id", category_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_progress_record_row).collect()
    }

    async fn record_user_attempt(
        &self,
        user_id: UserId,
        key: ProgressKey,
        score: Score,
        at: DateTime<Utc>,
    ) -> Result<StageProgress, StorageError> {
        // The max is taken inside the upsert so concurrent submissions cannot
        // overwrite a higher score with a lower one.
        let row = sqlx::query(
            r"
            INSERT INTO user_stage_progress (
                user_id, category_id, stage_number, is_unlocked, highest_score, updated_at
            )
            VALUES (?1, ?2, ?3, 1, ?4, ?5)
            ON CONFLICT(user_id, category_id, stage_number) DO UPDATE SET
                is_unlocked = 1,
                highest_score = MAX(user_stage_progress.highest_score, excluded.highest_score),
                updated_at = excluded.updated_at
            RETURNING is_unlocked, highest_score
            ",
        )
        .bind(user_id_text(user_id))
        .bind(id_i64("category_id", key.category_id.value())?)
        .bind(i64::from(key.stage_number.value()))
        .bind(score.as_percent())
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        map_progress_row(&row)
    }

    async fn unlock_user_stage(
        &self,
        user_id: UserId,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_stage_progress (
                user_id, category_id, stage_number, is_unlocked, highest_score, updated_at
            )
            VALUES (?1, ?2, ?3, 1, 0.0, ?4)
            ON CONFLICT(user_id, category_id, stage_number) DO UPDATE SET
                is_unlocked = 1,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_text(user_id))
        .bind(id_i64("category_id", key.category_id.value())?)
        .bind(i64::from(key.stage_number.value()))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
