use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_core::model::{
    Category, CategoryId, ProgressKey, ProgressRecord, Question, QuestionId, QuizResult, Score,
    Stage, StageNumber, StageProgress, UserId,
};
use quest_core::time::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Which backend a progress store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStoreKind {
    /// Device-local document for unauthenticated play.
    Guest,
    /// Account-scoped rows in the persistent store.
    Remote,
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Insert shape for a quiz result; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizResult {
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub stage_number: StageNumber,
    pub score: Score,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
}

impl NewQuizResult {
    #[must_use]
    pub fn with_id(self, id: i64) -> QuizResult {
        QuizResult {
            id,
            user_id: self.user_id,
            category_id: self.category_id,
            stage_number: self.stage_number,
            score: self.score,
            total_questions: self.total_questions,
            created_at: self.created_at,
        }
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read/write access to categories, stages and questions.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or update a category.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the category cannot be stored.
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError>;

    /// Fetch a category by ID, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError>;

    /// All categories ordered by display order, then ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_categories(&self) -> Result<Vec<Category>, StorageError>;

    /// Persist or update a stage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stage cannot be stored.
    async fn upsert_stage(&self, stage: &Stage) -> Result<(), StorageError>;

    /// Fetch one stage, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Option<Stage>, StorageError>;

    /// Stages of a category ordered by stage number, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_stages(
        &self,
        category_id: CategoryId,
        limit: u32,
    ) -> Result<Vec<Stage>, StorageError>;

    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Questions of one stage ordered by question ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for rows violating question
    /// invariants, or other storage errors.
    async fn questions_for_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Vec<Question>, StorageError>;
}

/// Account-scoped stage progress in the persistent store.
///
/// Writes are single atomic upserts: the stored `highest_score` is combined
/// with the incoming value inside the store, never read back and rewritten.
#[async_trait]
pub trait UserProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_user_progress(
        &self,
        user_id: UserId,
        key: ProgressKey,
    ) -> Result<Option<StageProgress>, StorageError>;

    /// All records of a user within one category, ordered by stage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_user_progress(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Upsert `is_unlocked = true, highest_score = max(stored, score)` stamped
    /// with `at`, and return the stored progress afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn record_user_attempt(
        &self,
        user_id: UserId,
        key: ProgressKey,
        score: Score,
        at: DateTime<Utc>,
    ) -> Result<StageProgress, StorageError>;

    /// Insert an unlocked record with a zero score, or flip `is_unlocked` on
    /// an existing one without touching its score.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn unlock_user_stage(
        &self,
        user_id: UserId,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Append-only log of submitted attempts.
#[async_trait]
pub trait QuizResultRepository: Send + Sync {
    /// Append a result and return its ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    async fn append_result(&self, result: NewQuizResult) -> Result<i64, StorageError>;

    /// Results of a user, newest first, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<QuizResult>, StorageError>;
}

/// Progress operations of one identity, independent of where they are kept.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    fn kind(&self) -> ProgressStoreKind;

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read.
    async fn get_progress(&self, key: ProgressKey) -> Result<Option<StageProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn category_progress(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Mark the stage unlocked and raise its best score to at least `score`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn record_attempt(
        &self,
        key: ProgressKey,
        score: Score,
    ) -> Result<StageProgress, StorageError>;

    /// Unlock a stage, creating it with a zero score when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn unlock(&self, key: ProgressKey) -> Result<(), StorageError>;
}

//
// ─── REMOTE ADAPTER ────────────────────────────────────────────────────────────
//

/// `ProgressStore` view of the persistent store bound to one account.
///
/// Writes are stamped with `clock`.
#[derive(Clone)]
pub struct RemoteProgressStore {
    user_id: UserId,
    repo: Arc<dyn UserProgressRepository>,
    clock: Clock,
}

impl RemoteProgressStore {
    #[must_use]
    pub fn new(user_id: UserId, repo: Arc<dyn UserProgressRepository>, clock: Clock) -> Self {
        Self {
            user_id,
            repo,
            clock,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[async_trait]
impl ProgressStore for RemoteProgressStore {
    fn kind(&self) -> ProgressStoreKind {
        ProgressStoreKind::Remote
    }

    async fn get_progress(&self, key: ProgressKey) -> Result<Option<StageProgress>, StorageError> {
        self.repo.get_user_progress(self.user_id, key).await
    }

    async fn category_progress(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.repo.list_user_progress(self.user_id, category_id).await
    }

    async fn record_attempt(
        &self,
        key: ProgressKey,
        score: Score,
    ) -> Result<StageProgress, StorageError> {
        self.repo
            .record_user_attempt(self.user_id, key, score, self.clock.now())
            .await
    }

    async fn unlock(&self, key: ProgressKey) -> Result<(), StorageError> {
        self.repo
            .unlock_user_stage(self.user_id, key, self.clock.now())
            .await
    }
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    categories: HashMap<CategoryId, Category>,
    stages: BTreeMap<(CategoryId, StageNumber), Stage>,
    questions: BTreeMap<QuestionId, Question>,
    progress: BTreeMap<(UserId, ProgressKey), StageProgress>,
    results: Vec<QuizResult>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError> {
        self.lock()?
            .categories
            .insert(category.id(), category.clone());
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError> {
        Ok(self.lock()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let mut categories: Vec<Category> = self.lock()?.categories.values().cloned().collect();
        categories.sort_by_key(|c| (c.order(), c.id()));
        Ok(categories)
    }

    async fn upsert_stage(&self, stage: &Stage) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.categories.contains_key(&stage.category_id) {
            return Err(StorageError::Conflict);
        }
        guard
            .stages
            .insert((stage.category_id, stage.stage_number), stage.clone());
        Ok(())
    }

    async fn get_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Option<Stage>, StorageError> {
        Ok(self.lock()?.stages.get(&(category_id, stage_number)).cloned())
    }

    async fn list_stages(
        &self,
        category_id: CategoryId,
        limit: u32,
    ) -> Result<Vec<Stage>, StorageError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .lock()?
            .stages
            .range((category_id, StageNumber::new(0))..=(category_id, StageNumber::new(u32::MAX)))
            .map(|(_, stage)| stage.clone())
            .take(limit)
            .collect())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard
            .stages
            .contains_key(&(question.category_id(), question.stage_number()))
        {
            return Err(StorageError::Conflict);
        }
        guard.questions.insert(question.id(), question.clone());
        Ok(())
    }

    async fn questions_for_stage(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Vec<Question>, StorageError> {
        Ok(self
            .lock()?
            .questions
            .values()
            .filter(|q| q.category_id() == category_id && q.stage_number() == stage_number)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserProgressRepository for InMemoryRepository {
    async fn get_user_progress(
        &self,
        user_id: UserId,
        key: ProgressKey,
    ) -> Result<Option<StageProgress>, StorageError> {
        Ok(self.lock()?.progress.get(&(user_id, key)).copied())
    }

    async fn list_user_progress(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(self
            .lock()?
            .progress
            .iter()
            .filter(|((user, key), _)| *user == user_id && key.category_id == category_id)
            .map(|((_, key), progress)| ProgressRecord {
                key: *key,
                progress: *progress,
            })
            .collect())
    }

    async fn record_user_attempt(
        &self,
        user_id: UserId,
        key: ProgressKey,
        score: Score,
        _at: DateTime<Utc>,
    ) -> Result<StageProgress, StorageError> {
        let mut guard = self.lock()?;
        let entry = guard.progress.entry((user_id, key)).or_default();
        *entry = entry.with_attempt(score);
        Ok(*entry)
    }

    async fn unlock_user_stage(
        &self,
        user_id: UserId,
        key: ProgressKey,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let entry = guard.progress.entry((user_id, key)).or_default();
        *entry = entry.with_unlock();
        Ok(())
    }
}

#[async_trait]
impl QuizResultRepository for InMemoryRepository {
    async fn append_result(&self, result: NewQuizResult) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        let id = i64::try_from(guard.results.len())
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?
            + 1;
        guard.results.push(result.with_id(id));
        Ok(id)
    }

    async fn results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut results: Vec<QuizResult> = self
            .lock()?
            .results
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        results.truncate(limit);
        Ok(results)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the persistent-store repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub progress: Arc<dyn UserProgressRepository>,
    pub results: Arc<dyn QuizResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Share one backend across all three repository roles.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CatalogRepository + UserProgressRepository + QuizResultRepository + Clone + 'static,
    {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn UserProgressRepository> = Arc::new(repo.clone());
        let results: Arc<dyn QuizResultRepository> = Arc::new(repo);
        Self {
            catalog,
            progress,
            results,
        }
    }

    /// Progress store for `user_id` backed by this storage.
    #[must_use]
    pub fn remote_progress(&self, user_id: UserId, clock: Clock) -> RemoteProgressStore {
        RemoteProgressStore::new(user_id, Arc::clone(&self.progress), clock)
    }
}
