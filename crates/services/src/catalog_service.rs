use std::sync::Arc;
use std::time::Duration;

use quest_core::model::{AnswerSheet, Category, CategoryId, Question, Stage, StageNumber};
use storage::repository::CatalogRepository;

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::error::CatalogError;
use crate::progress_service::STAGE_LIST_LIMIT;
use crate::timeout::bounded;

/// Read-only access to categories, stages and their questions.
#[derive(Clone)]
pub struct CatalogService {
    store_timeout: Duration,
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            catalog,
        }
    }

    #[must_use]
    pub fn with_store_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }

    /// All categories by display order, then id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the catalog cannot be read.
    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        Ok(bounded(self.store_timeout, self.catalog.list_categories()).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::CategoryNotFound` for an unknown id.
    pub async fn get_category(&self, id: CategoryId) -> Result<Category, CatalogError> {
        bounded(self.store_timeout, self.catalog.get_category(id))
            .await?
            .ok_or(CatalogError::CategoryNotFound(id))
    }

    /// Stages of a category in stage order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the catalog cannot be read.
    pub async fn list_stages(&self, category_id: CategoryId) -> Result<Vec<Stage>, CatalogError> {
        Ok(bounded(
            self.store_timeout,
            self.catalog.list_stages(category_id, STAGE_LIST_LIMIT),
        )
        .await?)
    }

    /// Questions of one stage ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the catalog cannot be read.
    pub async fn stage_questions(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Vec<Question>, CatalogError> {
        Ok(bounded(
            self.store_timeout,
            self.catalog.questions_for_stage(category_id, stage_number),
        )
        .await?)
    }

    /// A blank sheet with every question of the stage unanswered.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the questions cannot be read.
    pub async fn new_answer_sheet(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<(Vec<Question>, AnswerSheet), CatalogError> {
        let questions = self.stage_questions(category_id, stage_number).await?;
        let sheet = AnswerSheet::seeded(&questions);
        Ok((questions, sheet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::model::QuestionId;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn categories_follow_display_order() {
        let repo = InMemoryRepository::new();
        for (id, name, order) in [(1, "Later", 5), (2, "First", 0), (3, "Also first", 0)] {
            let category = Category::with_defaults(CategoryId::new(id), name, order).unwrap();
            repo.upsert_category(&category).await.unwrap();
        }
        let service = CatalogService::new(Arc::new(repo));

        let ids: Vec<u64> = service
            .list_categories()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id().value())
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert!(matches!(
            service.get_category(CategoryId::new(42)).await,
            Err(CatalogError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn answer_sheet_starts_unanswered() {
        let repo = InMemoryRepository::new();
        let cat = CategoryId::new(1);
        let stage = StageNumber::new(1);
        repo.upsert_category(&Category::with_defaults(cat, "Rust", 0).unwrap())
            .await
            .unwrap();
        repo.upsert_stage(&Stage::new(cat, stage, "Basics", None))
            .await
            .unwrap();
        for id in [3, 1, 2] {
            let question = Question::new(
                QuestionId::new(id),
                cat,
                stage,
                "Pick one",
                vec!["x".into(), "y".into()],
                1,
                None,
            )
            .unwrap();
            repo.upsert_question(&question).await.unwrap();
        }
        let service = CatalogService::new(Arc::new(repo));

        let (questions, sheet) = service.new_answer_sheet(cat, stage).await.unwrap();
        let ids: Vec<u64> = questions.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sheet.answered_count(), 0);
        assert_eq!(sheet.selected(QuestionId::new(1)), None);
    }
}
