use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quest_core::model::{
    AnswerSheet, Category, CategoryId, Identity, ProgressKey, Question, Score, Stage, StageNumber,
    UserId,
};
use quest_core::scoring::{self, GradedAnswer};
use quest_core::{Clock, InvalidStageError, unlock};
use storage::repository::{
    CatalogRepository, NewQuizResult, ProgressStore, QuizResultRepository, RemoteProgressStore,
    UserProgressRepository,
};
use storage::GuestProgressStore;

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::error::{PersistenceOp, ProgressError, StoreKind};
use crate::timeout::bounded;

/// Most stages listed for one category.
pub const STAGE_LIST_LIMIT: u32 = 50;

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// What a stage submission produced and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub score: Score,
    pub correct: usize,
    pub total_questions: usize,
    /// Best score stored before this attempt, `None` for a first attempt.
    pub previous_highest: Option<Score>,
    pub highest_score: Score,
    pub next_stage_unlocked: Option<StageNumber>,
    pub graded: Vec<GradedAnswer>,
}

impl SubmitOutcome {
    #[must_use]
    pub fn is_new_best(&self) -> bool {
        self.previous_highest.is_none_or(|prev| self.score > prev)
    }
}

/// One row of a category's stage list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub stage: Stage,
    pub is_unlocked: bool,
    pub highest_score: Score,
    pub attempted: bool,
}

/// Guest records copied into an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: usize,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Unlock checks, stage submission and guest merge over whichever progress
/// store the caller's identity selects.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    store_timeout: Duration,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn UserProgressRepository>,
    results: Arc<dyn QuizResultRepository>,
    guest: GuestProgressStore,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn UserProgressRepository>,
        results: Arc<dyn QuizResultRepository>,
        guest: GuestProgressStore,
    ) -> Self {
        Self {
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            catalog,
            progress,
            results,
            guest,
        }
    }

    /// Bound every store call made by this service.
    #[must_use]
    pub fn with_store_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }

    fn store_for(&self, identity: Identity) -> Arc<dyn ProgressStore> {
        match identity {
            Identity::Guest => Arc::new(self.guest.clone()),
            Identity::User(user_id) => Arc::new(RemoteProgressStore::new(
                user_id,
                Arc::clone(&self.progress),
                self.clock,
            )),
        }
    }

    async fn load_category(&self, category_id: CategoryId) -> Result<Category, ProgressError> {
        bounded(self.store_timeout, self.catalog.get_category(category_id))
            .await
            .map_err(ProgressError::persistence(StoreKind::Catalog, PersistenceOp::Read))?
            .ok_or(ProgressError::CategoryNotFound(category_id))
    }

    async fn load_questions(
        &self,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<Vec<Question>, ProgressError> {
        let read = ProgressError::persistence(StoreKind::Catalog, PersistenceOp::Read);
        let stage = bounded(
            self.store_timeout,
            self.catalog.get_stage(category_id, stage_number),
        )
        .await
        .map_err(read)?;
        if stage.is_none() {
            return Err(ProgressError::StageNotFound {
                category: category_id,
                stage: stage_number,
            });
        }

        let questions = bounded(
            self.store_timeout,
            self.catalog.questions_for_stage(category_id, stage_number),
        )
        .await
        .map_err(ProgressError::persistence(StoreKind::Catalog, PersistenceOp::Read))?;
        if questions.is_empty() {
            return Err(InvalidStageError::NoQuestions.into());
        }
        Ok(questions)
    }

    /// Whether `identity` may play `stage_number` of `category_id`.
    ///
    /// The category's initial stage is open without touching the progress
    /// store.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CategoryNotFound` for an unknown category and
    /// `ProgressError::Persistence` if a store read fails.
    pub async fn is_unlocked(
        &self,
        identity: Identity,
        category_id: CategoryId,
        stage_number: StageNumber,
    ) -> Result<bool, ProgressError> {
        let category = self.load_category(category_id).await?;
        if category.is_initial(stage_number) {
            return Ok(true);
        }

        let store = self.store_for(identity);
        let progress = bounded(
            self.store_timeout,
            store.get_progress(ProgressKey::new(category_id, stage_number)),
        )
        .await
        .map_err(ProgressError::persistence(store.kind(), PersistenceOp::Read))?;

        Ok(unlock::is_unlocked(
            &category,
            stage_number,
            progress.as_ref(),
        ))
    }

    /// Score `answers`, keep the best score for the stage, open the next stage
    /// and, for accounts, append the attempt to the quiz history.
    ///
    /// Steps run in that order and are not rolled back: a failure after the
    /// score is recorded leaves the earlier writes in place.
    ///
    /// # Errors
    ///
    /// - `CategoryNotFound` / `StageNotFound` when the catalog has no such entry.
    /// - `InvalidStage` when the stage has no questions.
    /// - `Persistence` with the failing store and operation otherwise.
    pub async fn submit_stage(
        &self,
        identity: Identity,
        category_id: CategoryId,
        stage_number: StageNumber,
        answers: &AnswerSheet,
    ) -> Result<SubmitOutcome, ProgressError> {
        let category = self.load_category(category_id).await?;
        let questions = self.load_questions(category_id, stage_number).await?;
        let tally = scoring::tally(&questions, answers)?;
        let graded = scoring::grade_answers(&questions, answers);

        let store = self.store_for(identity);
        let key = ProgressKey::new(category_id, stage_number);

        let previous = bounded(self.store_timeout, store.get_progress(key))
            .await
            .map_err(ProgressError::persistence(store.kind(), PersistenceOp::Read))?;

        let updated = bounded(self.store_timeout, store.record_attempt(key, tally.score))
            .await
            .map_err(ProgressError::persistence(store.kind(), PersistenceOp::Write))?;

        let next_stage = unlock::next_stage_to_unlock(&category, stage_number);
        if let Some(next) = next_stage {
            bounded(
                self.store_timeout,
                store.unlock(ProgressKey::new(category_id, next)),
            )
            .await
            .map_err(ProgressError::persistence(store.kind(), PersistenceOp::Write))?;
            tracing::debug!(category_id = %category_id, stage = %next, "stage unlocked");
        }

        if let Identity::User(user_id) = identity {
            let total_questions = u32::try_from(tally.total).map_err(|_| {
                InvalidStageError::Malformed(format!("{} questions in one stage", tally.total))
            })?;
            bounded(
                self.store_timeout,
                self.results.append_result(NewQuizResult {
                    user_id,
                    category_id,
                    stage_number,
                    score: tally.score,
                    total_questions,
                    created_at: self.clock.now(),
                }),
            )
            .await
            .map_err(ProgressError::persistence(StoreKind::Results, PersistenceOp::Write))?;
        }

        tracing::info!(
            category_id = %category_id,
            stage = %stage_number,
            guest = identity.is_guest(),
            score = %tally.score,
            highest = %updated.highest_score,
            "stage submitted"
        );

        Ok(SubmitOutcome {
            score: tally.score,
            correct: tally.correct,
            total_questions: tally.total,
            previous_highest: previous.map(|p| p.highest_score),
            highest_score: updated.highest_score,
            next_stage_unlocked: next_stage,
            graded,
        })
    }

    /// Every stage of a category with the caller's progress on it.
    ///
    /// # Errors
    ///
    /// - `CategoryNotFound` for an unknown category.
    /// - `StageNotFound` (for the initial stage) when the category has no stages.
    /// - `InvalidStage` when the initial stage is not among the listed stages.
    /// - `Persistence` if a store read fails.
    pub async fn stage_overview(
        &self,
        identity: Identity,
        category_id: CategoryId,
    ) -> Result<Vec<StageStatus>, ProgressError> {
        let category = self.load_category(category_id).await?;
        let stages = bounded(
            self.store_timeout,
            self.catalog.list_stages(category_id, STAGE_LIST_LIMIT),
        )
        .await
        .map_err(ProgressError::persistence(StoreKind::Catalog, PersistenceOp::Read))?;

        if stages.is_empty() {
            return Err(ProgressError::StageNotFound {
                category: category_id,
                stage: category.initial_stage(),
            });
        }
        if !stages
            .iter()
            .any(|s| s.stage_number == category.initial_stage())
        {
            return Err(InvalidStageError::MissingInitialStage {
                category: category_id,
                initial: category.initial_stage(),
            }
            .into());
        }

        let store = self.store_for(identity);
        let records: HashMap<StageNumber, _> =
            bounded(self.store_timeout, store.category_progress(category_id))
                .await
                .map_err(ProgressError::persistence(store.kind(), PersistenceOp::Read))?
                .into_iter()
                .map(|r| (r.key.stage_number, r.progress))
                .collect();

        Ok(stages
            .into_iter()
            .map(|stage| {
                let progress = records.get(&stage.stage_number);
                let highest_score = progress.map_or(Score::ZERO, |p| p.highest_score);
                StageStatus {
                    is_unlocked: unlock::is_unlocked(&category, stage.stage_number, progress),
                    highest_score,
                    attempted: highest_score > Score::ZERO,
                    stage,
                }
            })
            .collect())
    }

    /// Copy every guest record into `user_id`'s account, keeping the higher
    /// score where both exist.
    ///
    /// Records that were written are removed from the guest store unless they
    /// changed while the merge ran; the rest stay behind so a later call can
    /// retry them. An empty guest store is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `MergeIncomplete` when some records could not be written.
    /// - `Persistence` if the guest store cannot be read or updated.
    pub async fn merge_guest_progress(&self, user_id: UserId) -> Result<MergeReport, ProgressError> {
        let records = self
            .guest
            .records()
            .map_err(ProgressError::persistence(StoreKind::Guest, PersistenceOp::Read))?;
        if records.is_empty() {
            return Ok(MergeReport { merged: 0 });
        }

        let mut merged = Vec::with_capacity(records.len());
        let mut first_error = None;
        let mut failed = 0;
        for record in &records {
            let write = bounded(
                self.store_timeout,
                self.progress.record_user_attempt(
                    user_id,
                    record.key,
                    record.progress.highest_score,
                    self.clock.now(),
                ),
            )
            .await;
            match write {
                Ok(_) => merged.push(*record),
                Err(err) => {
                    tracing::warn!(
                        category_id = %record.key.category_id,
                        stage = %record.key.stage_number,
                        error = %err,
                        "guest record not merged"
                    );
                    failed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        self.guest
            .remove_merged(&merged)
            .map_err(ProgressError::persistence(StoreKind::Guest, PersistenceOp::Write))?;
        if let Some(source) = first_error {
            return Err(ProgressError::MergeIncomplete {
                merged: merged.len(),
                failed,
                source,
            });
        }

        tracing::info!(user_id = %user_id, merged = merged.len(), "guest progress merged");

        Ok(MergeReport {
            merged: merged.len(),
        })
    }
}
