use async_trait::async_trait;
use quest_core::model::{Category, CategoryId, Question, Stage, StageNumber};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_category_row, map_question_row, map_stage_row, ser};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO categories (id, name, description, sort_order, initial_stage_number, max_stage)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                sort_order = excluded.sort_order,
                initial_stage_number = excluded.initial_stage_number,
                max_stage = excluded.max_stage
            ",
        )
        .bind(id_i64("category_id", category.id().value())?)
        .bind(category.name())
        .bind(category.description())
        .bind(i64::from(category.order()))
        .bind(i64::from(category.initial_stage().value()))
        .bind(i64::from(category.max_stage().value()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, name, description, sort_order, initial_stage_number, max_stage
            FROM categories WHERE id = ?1
            ",
        )
        .bind(id_i64("category_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_category_row).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, description, sort_order, initial_stage_number, max_stage
            FROM categories
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_category_row).collect()
    }

    async fn upsert_stage(&self, stage: &Stage) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO category_stages (category_id, stage_number, title, description)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(category_id, stage_number) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            ",
        )
        .bind(id_i64("category_id", stage.category_id.value())?)
        .bind(i64::from(stage.stage_number.value()))
        .bind(stage.title.as_str())
        .bind(stage.description.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::Conflict,
            other => conn(other),
        })?;

        Ok(())
    }

    async fn get_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Option<Stage>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT category_id, stage_number, title, description
            FROM category_stages
            WHERE category_id = ?1 AND stage_number = ?2
            ",
        )
        .bind(id_i64("category_id", category_id.value())?)
        .bind(i64::from(stage_number.value()))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_stage_row).transpose()
    }

    async fn list_stages(
        &self,
        category_id: CategoryId,
        limit: u32,
    ) -> Result<Vec<Stage>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT category_id, stage_number, title, description
            FROM category_stages
            WHERE category_id = ?1
            ORDER BY stage_number ASC
            LIMIT ?2
            ",
        )
        .bind(id_i64("category_id", category_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_stage_row).collect()
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options = serde_json::to_string(question.options()).map_err(ser)?;
        let correct_index = i64::try_from(question.correct_index())
            .map_err(|_| StorageError::Serialization("correct_index overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO questions (id, category_id, stage_number, question, options, correct_index, explanation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                category_id = excluded.category_id,
                stage_number = excluded.stage_number,
                question = excluded.question,
                options = excluded.options,
                correct_index = excluded.correct_index,
                explanation = excluded.explanation
            ",
        )
        .bind(id_i64("question_id", question.id().value())?)
        .bind(id_i64("category_id", question.category_id().value())?)
        .bind(i64::from(question.stage_number().value()))
        .bind(question.prompt())
        .bind(options)
        .bind(correct_index)
        .bind(question.explanation())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::Conflict,
            other => conn(other),
        })?;

        Ok(())
    }

    async fn questions_for_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, category_id, stage_number, question, options, correct_index, explanation
            FROM questions
            WHERE category_id = ?1 AND stage_number = ?2
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("category_id", category_id.value())?)
        .bind(i64::from(stage_number.value()))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}
