use async_trait::async_trait;
use quest_core::model::{QuizResult, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_quiz_result_row, user_id_text};
use crate::repository::{NewQuizResult, QuizResultRepository, StorageError};

#[async_trait]
impl QuizResultRepository for SqliteRepository {
    async fn append_result(&self, result: NewQuizResult) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO quiz_results (
                user_id, category_id, stage_number, score, total_questions, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(user_id_text(result.user_id))
        .bind(id_i64("category_id", result.category_id.value())?)
        .bind(i64::from(result.stage_number.value()))
        .bind(result.score.as_percent())
        .bind(i64::from(result.total_questions))
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, category_id, stage_number, score, total_questions, created_at
            FROM quiz_results
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(user_id_text(user_id))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_quiz_result_row).collect()
    }
}
