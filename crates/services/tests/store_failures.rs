use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_core::model::{
    AnswerSheet, Category, CategoryId, Identity, ProgressKey, ProgressRecord, Question, QuestionId,
    Score, Stage, StageNumber, StageProgress, UserId,
};
use quest_core::time::fixed_clock;
use services::{MergeReport, PersistenceOp, ProgressError, ProgressService, StoreKind};
use storage::repository::{
    CatalogRepository, InMemoryRepository, ProgressStore, QuizResultRepository, StorageError,
    UserProgressRepository,
};
use storage::{GUEST_PROGRESS_KEY, GuestProgressStore, KeyValueStore, MemoryKeyValueStore};

const CATEGORY: CategoryId = CategoryId::new(1);

fn key(stage: u32) -> ProgressKey {
    ProgressKey::new(CATEGORY, StageNumber::new(stage))
}

/// Progress repository whose calls for one stage fail while a toggle is set.
#[derive(Clone)]
struct FlakyProgress {
    inner: InMemoryRepository,
    broken: ProgressKey,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_unlocks: Arc<AtomicBool>,
}

impl FlakyProgress {
    fn new(inner: InMemoryRepository, broken: ProgressKey) -> Self {
        Self {
            inner,
            broken,
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_unlocks: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check(&self, key: ProgressKey, toggle: &AtomicBool) -> Result<(), StorageError> {
        if key == self.broken && toggle.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserProgressRepository for FlakyProgress {
    async fn get_user_progress(
        &self,
        user_id: UserId,
        key: ProgressKey,
    ) -> Result<Option<StageProgress>, StorageError> {
        self.check(key, &self.fail_reads)?;
        self.inner.get_user_progress(user_id, key).await
    }

    async fn list_user_progress(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.inner.list_user_progress(user_id, category_id).await
    }

    async fn record_user_attempt(
        &self,
        user_id: UserId,
        key: ProgressKey,
        score: Score,
        at: DateTime<Utc>,
    ) -> Result<StageProgress, StorageError> {
        self.check(key, &self.fail_writes)?;
        self.inner.record_user_attempt(user_id, key, score, at).await
    }

    async fn unlock_user_stage(
        &self,
        user_id: UserId,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.check(key, &self.fail_unlocks)?;
        self.inner.unlock_user_stage(user_id, key, at).await
    }
}

/// Catalog repository that never answers.
struct HangingCatalog;

#[async_trait]
impl CatalogRepository for HangingCatalog {
    async fn upsert_category(&self, _category: &Category) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn get_category(&self, _id: CategoryId) -> Result<Option<Category>, StorageError> {
        std::future::pending().await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        std::future::pending().await
    }

    async fn upsert_stage(&self, _stage: &Stage) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn get_stage(
        &self,
        _category_id: CategoryId,
        _stage_number: StageNumber,
    ) -> Result<Option<Stage>, StorageError> {
        std::future::pending().await
    }

    async fn list_stages(
        &self,
        _category_id: CategoryId,
        _limit: u32,
    ) -> Result<Vec<Stage>, StorageError> {
        std::future::pending().await
    }

    async fn upsert_question(&self, _question: &Question) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn questions_for_stage(
        &self,
        _category_id: CategoryId,
        _stage_number: StageNumber,
    ) -> Result<Vec<Question>, StorageError> {
        std::future::pending().await
    }
}

async fn seeded_repo() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.upsert_category(&Category::with_defaults(CATEGORY, "Music", 0).unwrap())
        .await
        .unwrap();
    repo.upsert_stage(&Stage::new(CATEGORY, StageNumber::new(1), "Notes", None))
        .await
        .unwrap();
    repo.upsert_question(
        &Question::new(
            QuestionId::new(1),
            CATEGORY,
            StageNumber::new(1),
            "How many lines on a staff?",
            vec!["4".into(), "5".into()],
            1,
            None,
        )
        .unwrap(),
    )
    .await
    .unwrap();
    repo
}

#[tokio::test]
async fn partial_merge_leaves_failed_records_for_retry() {
    let repo = seeded_repo().await;
    let flaky = FlakyProgress::new(repo.clone(), key(2));
    flaky.fail_writes.store(true, Ordering::SeqCst);
    let guest = GuestProgressStore::new(Arc::new(MemoryKeyValueStore::new()));
    guest
        .record_attempt(key(1), Score::from_percent(70.0).unwrap())
        .await
        .unwrap();
    guest.unlock(key(2)).await.unwrap();

    let service = ProgressService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(flaky.clone()),
        Arc::new(repo.clone()),
        guest.clone(),
    );
    let user = UserId::random();

    let err = service.merge_guest_progress(user).await.unwrap_err();
    assert!(matches!(
        err,
        ProgressError::MergeIncomplete {
            merged: 1,
            failed: 1,
            source: StorageError::Connection(_),
        }
    ));
    let left: Vec<ProgressKey> = guest.records().unwrap().iter().map(|r| r.key).collect();
    assert_eq!(left, vec![key(2)]);
    assert!(repo.get_user_progress(user, key(1)).await.unwrap().is_some());

    flaky.fail_writes.store(false, Ordering::SeqCst);
    let report = service.merge_guest_progress(user).await.unwrap();
    assert_eq!(report, MergeReport { merged: 1 });
    assert!(guest.records().unwrap().is_empty());
}

#[tokio::test]
async fn failed_score_write_is_a_remote_write_error() {
    let repo = seeded_repo().await;
    let flaky = FlakyProgress::new(repo.clone(), key(1));
    flaky.fail_writes.store(true, Ordering::SeqCst);
    let guest = GuestProgressStore::new(Arc::new(MemoryKeyValueStore::new()));
    let service = ProgressService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(flaky),
        Arc::new(repo),
        guest,
    );

    let err = service
        .submit_stage(
            Identity::User(UserId::random()),
            CATEGORY,
            StageNumber::new(1),
            &AnswerSheet::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProgressError::Persistence {
            store: StoreKind::Remote,
            op: PersistenceOp::Write,
            ..
        }
    ));
}

fn service_over(
    repo: &InMemoryRepository,
    flaky: &FlakyProgress,
    guest: GuestProgressStore,
) -> ProgressService {
    ProgressService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(flaky.clone()),
        Arc::new(repo.clone()),
        guest,
    )
}

fn memory_guest() -> (GuestProgressStore, MemoryKeyValueStore) {
    let kv = MemoryKeyValueStore::new();
    (GuestProgressStore::new(Arc::new(kv.clone())), kv)
}

#[tokio::test]
async fn failed_progress_read_is_a_remote_read_error() {
    let repo = seeded_repo().await;
    let flaky = FlakyProgress::new(repo.clone(), key(1));
    flaky.fail_reads.store(true, Ordering::SeqCst);
    let service = service_over(&repo, &flaky, memory_guest().0);
    let user = UserId::random();

    let err = service
        .submit_stage(Identity::User(user), CATEGORY, StageNumber::new(1), &AnswerSheet::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProgressError::Persistence {
            store: StoreKind::Remote,
            op: PersistenceOp::Read,
            source: StorageError::Connection(_),
        }
    ));
    assert!(repo.get_user_progress(user, key(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_unlock_leaves_the_recorded_score_in_place() {
    let repo = seeded_repo().await;
    let flaky = FlakyProgress::new(repo.clone(), key(2));
    flaky.fail_unlocks.store(true, Ordering::SeqCst);
    let service = service_over(&repo, &flaky, memory_guest().0);
    let user = UserId::random();

    let err = service
        .submit_stage(Identity::User(user), CATEGORY, StageNumber::new(1), &AnswerSheet::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProgressError::Persistence {
            store: StoreKind::Remote,
            op: PersistenceOp::Write,
            ..
        }
    ));

    let recorded = repo.get_user_progress(user, key(1)).await.unwrap().unwrap();
    assert!(recorded.is_unlocked);
    assert_eq!(recorded.highest_score, Score::ZERO);
    assert!(repo.get_user_progress(user, key(2)).await.unwrap().is_none());
    assert!(repo.results_for_user(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_guest_document_is_a_guest_read_error() {
    let repo = seeded_repo().await;
    let flaky = FlakyProgress::new(repo.clone(), key(1));
    let (guest, kv) = memory_guest();
    kv.set(GUEST_PROGRESS_KEY, "{\"1\": [").unwrap();
    let service = service_over(&repo, &flaky, guest);

    let guest_read = |err: &ProgressError| {
        matches!(
            err,
            ProgressError::Persistence {
                store: StoreKind::Guest,
                op: PersistenceOp::Read,
                source: StorageError::Serialization(_),
            }
        )
    };

    let err = service
        .submit_stage(Identity::Guest, CATEGORY, StageNumber::new(1), &AnswerSheet::new())
        .await
        .unwrap_err();
    assert!(guest_read(&err));

    let err = service
        .merge_guest_progress(UserId::random())
        .await
        .unwrap_err();
    assert!(guest_read(&err));

    assert_eq!(kv.get(GUEST_PROGRESS_KEY).unwrap().as_deref(), Some("{\"1\": ["));
}

/// Progress repository that lets the guest play one more stage while the
/// first merged record is being written.
struct GuestPlaysDuringMerge {
    inner: InMemoryRepository,
    guest: GuestProgressStore,
    played: AtomicBool,
}

#[async_trait]
impl UserProgressRepository for GuestPlaysDuringMerge {
    async fn get_user_progress(
        &self,
        user_id: UserId,
        key: ProgressKey,
    ) -> Result<Option<StageProgress>, StorageError> {
        self.inner.get_user_progress(user_id, key).await
    }

    async fn list_user_progress(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.inner.list_user_progress(user_id, category_id).await
    }

    async fn record_user_attempt(
        &self,
        user_id: UserId,
        key: ProgressKey,
        score: Score,
        at: DateTime<Utc>,
    ) -> Result<StageProgress, StorageError> {
        if !self.played.swap(true, Ordering::SeqCst) {
            self.guest
                .record_attempt(key, Score::from_percent(95.0).unwrap())
                .await?;
            self.guest.unlock(ProgressKey::new(CATEGORY, StageNumber::new(5))).await?;
        }
        self.inner.record_user_attempt(user_id, key, score, at).await
    }

    async fn unlock_user_stage(
        &self,
        user_id: UserId,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.unlock_user_stage(user_id, key, at).await
    }
}

#[tokio::test]
async fn guest_writes_during_a_merge_are_not_discarded() {
    let repo = seeded_repo().await;
    let (guest, _) = memory_guest();
    guest
        .record_attempt(key(1), Score::from_percent(40.0).unwrap())
        .await
        .unwrap();
    guest.unlock(key(2)).await.unwrap();

    let progress = GuestPlaysDuringMerge {
        inner: repo.clone(),
        guest: guest.clone(),
        played: AtomicBool::new(false),
    };
    let service = ProgressService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(progress),
        Arc::new(repo.clone()),
        guest.clone(),
    );
    let user = UserId::random();

    let report = service.merge_guest_progress(user).await.unwrap();
    assert_eq!(report, MergeReport { merged: 2 });

    let left: Vec<(u32, Score)> = guest
        .records()
        .unwrap()
        .iter()
        .map(|r| (r.key.stage_number.value(), r.progress.highest_score))
        .collect();
    assert_eq!(
        left,
        vec![(1, Score::from_percent(95.0).unwrap()), (5, Score::ZERO)]
    );

    let report = service.merge_guest_progress(user).await.unwrap();
    assert_eq!(report, MergeReport { merged: 2 });
    assert!(guest.records().unwrap().is_empty());
    let best = repo.get_user_progress(user, key(1)).await.unwrap().unwrap();
    assert_eq!(best.highest_score, Score::from_percent(95.0).unwrap());
}

#[tokio::test(start_paused = true)]
async fn hanging_catalog_times_out() {
    let repo = InMemoryRepository::new();
    let limit = Duration::from_millis(200);
    let service = ProgressService::new(
        fixed_clock(),
        Arc::new(HangingCatalog),
        Arc::new(repo.clone()),
        Arc::new(repo),
        GuestProgressStore::new(Arc::new(MemoryKeyValueStore::new())),
    )
    .with_store_timeout(limit);

    let err = service
        .is_unlocked(Identity::Guest, CATEGORY, StageNumber::new(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProgressError::Persistence {
            store: StoreKind::Catalog,
            op: PersistenceOp::Read,
            source: StorageError::Timeout(d),
        } if d == limit
    ));
}
