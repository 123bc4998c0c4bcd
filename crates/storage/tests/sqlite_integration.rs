use quest_core::model::{
    Category, CategoryId, ProgressKey, Question, QuestionId, Score, Stage, StageNumber, UserId,
};
use chrono::{DateTime, Utc};
use quest_core::time::{Clock, fixed_now};
use storage::repository::{
    CatalogRepository, NewQuizResult, ProgressStore, QuizResultRepository, Storage, StorageError,
    UserProgressRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn score(p: f64) -> Score {
    Score::from_percent(p).unwrap()
}

fn key(category: u64, stage: u32) -> ProgressKey {
    ProgressKey::new(CategoryId::new(category), StageNumber::new(stage))
}

async fn seed_stage(repo: &SqliteRepository, category: u64, stage: u32, questions: u64) {
    let category_id = CategoryId::new(category);
    let stage_number = StageNumber::new(stage);
    if repo.get_category(category_id).await.unwrap().is_none() {
        let category = Category::with_defaults(category_id, "Rust", 0).unwrap();
        repo.upsert_category(&category).await.unwrap();
    }
    repo.upsert_stage(&Stage::new(category_id, stage_number, "Stage", None))
        .await
        .unwrap();
    for n in 0..questions {
        let question = Question::new(
            QuestionId::new(category * 1000 + u64::from(stage) * 100 + n + 1),
            category_id,
            stage_number,
            format!("Q{n}"),
            vec!["a".into(), "b".into(), "c".into()],
            1,
            None,
        )
        .unwrap();
        repo.upsert_question(&question).await.unwrap();
    }
}

#[tokio::test]
async fn catalog_roundtrip_keeps_unlock_configuration() {
    let repo = connect("memdb_catalog").await;

    let category = Category::new(
        CategoryId::new(3),
        "Ownership",
        Some("Borrowing basics".into()),
        2,
        StageNumber::new(2),
        StageNumber::new(5),
    )
    .unwrap();
    repo.upsert_category(&category).await.unwrap();

    let fetched = repo.get_category(category.id()).await.unwrap().unwrap();
    assert_eq!(fetched, category);
    assert!(repo.get_category(CategoryId::new(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn questions_come_back_in_id_order_with_options() {
    let repo = connect("memdb_questions").await;
    seed_stage(&repo, 1, 1, 5).await;
    seed_stage(&repo, 1, 2, 2).await;

    let questions = repo
        .questions_for_stage(CategoryId::new(1), StageNumber::new(1))
        .await
        .unwrap();
    assert_eq!(questions.len(), 5);
    assert!(questions.windows(2).all(|w| w[0].id() < w[1].id()));
    assert_eq!(questions[0].options().len(), 3);
    assert_eq!(questions[0].correct_index(), 1);

    let stages = repo.list_stages(CategoryId::new(1), 50).await.unwrap();
    let numbers: Vec<u32> = stages.iter().map(|s| s.stage_number.value()).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn stage_without_category_is_a_conflict() {
    let repo = connect("memdb_orphan_stage").await;
    let err = repo
        .upsert_stage(&Stage::new(
            CategoryId::new(42),
            StageNumber::new(1),
            "Orphan",
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn recorded_attempt_keeps_the_highest_score() {
    let repo = connect("memdb_best_score").await;
    let user = UserId::random();

    let first = repo
        .record_user_attempt(user, key(1, 1), score(80.0), fixed_now())
        .await
        .unwrap();
    assert!(first.is_unlocked);
    assert_eq!(first.highest_score, score(80.0));

    let second = repo
        .record_user_attempt(user, key(1, 1), score(55.0), fixed_now())
        .await
        .unwrap();
    assert_eq!(second.highest_score, score(80.0));

    let third = repo
        .record_user_attempt(user, key(1, 1), score(92.5), fixed_now())
        .await
        .unwrap();
    assert_eq!(third.highest_score, score(92.5));
}

#[tokio::test]
async fn unlock_does_not_reset_an_existing_score() {
    let repo = connect("memdb_unlock").await;
    let user = UserId::random();

    repo.unlock_user_stage(user, key(1, 2), fixed_now()).await.unwrap();
    let fresh = repo.get_user_progress(user, key(1, 2)).await.unwrap().unwrap();
    assert!(fresh.is_unlocked);
    assert_eq!(fresh.highest_score, Score::ZERO);

    repo.record_user_attempt(user, key(1, 2), score(60.0), fixed_now())
        .await
        .unwrap();
    repo.unlock_user_stage(user, key(1, 2), fixed_now()).await.unwrap();
    let after = repo.get_user_progress(user, key(1, 2)).await.unwrap().unwrap();
    assert_eq!(after.highest_score, score(60.0));
}

#[tokio::test]
async fn progress_listing_is_per_user_and_ordered() {
    let repo = connect("memdb_progress_list").await;
    let alice = UserId::random();
    let bob = UserId::random();

    for stage in [3, 1, 2] {
        repo.unlock_user_stage(alice, key(1, stage), fixed_now()).await.unwrap();
    }
    repo.unlock_user_stage(alice, key(2, 1), fixed_now()).await.unwrap();
    repo.unlock_user_stage(bob, key(1, 1), fixed_now()).await.unwrap();

    let records = repo
        .list_user_progress(alice, CategoryId::new(1))
        .await
        .unwrap();
    let stages: Vec<u32> = records.iter().map(|r| r.key.stage_number.value()).collect();
    assert_eq!(stages, vec![1, 2, 3]);

    assert!(
        repo.get_user_progress(bob, key(1, 2))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn quiz_results_are_listed_newest_first() {
    let repo = connect("memdb_results").await;
    let user = UserId::random();
    let other = UserId::random();

    for (offset, stage) in [(0, 1), (60, 2), (30, 3)] {
        repo.append_result(NewQuizResult {
            user_id: user,
            category_id: CategoryId::new(1),
            stage_number: StageNumber::new(stage),
            score: score(60.0),
            total_questions: 5,
            created_at: fixed_now() + chrono::Duration::seconds(offset),
        })
        .await
        .unwrap();
    }
    repo.append_result(NewQuizResult {
        user_id: other,
        category_id: CategoryId::new(1),
        stage_number: StageNumber::new(1),
        score: score(100.0),
        total_questions: 5,
        created_at: fixed_now(),
    })
    .await
    .unwrap();

    let results = repo.results_for_user(user, 10).await.unwrap();
    let stages: Vec<u32> = results.iter().map(|r| r.stage_number.value()).collect();
    assert_eq!(stages, vec![2, 3, 1]);
    assert!(results.iter().all(|r| r.user_id == user));
    assert_eq!(results[0].total_questions, 5);

    let limited = repo.results_for_user(user, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    seed_stage(&repo, 1, 1, 1).await;
}

async fn updated_at(repo: &SqliteRepository, user: UserId, key: ProgressKey) -> DateTime<Utc> {
    sqlx::query_scalar(
        "SELECT updated_at FROM user_stage_progress
         WHERE user_id = ?1 AND category_id = ?2 AND stage_number = ?3",
    )
    .bind(user.to_string())
    .bind(i64::try_from(key.category_id.value()).unwrap())
    .bind(i64::from(key.stage_number.value()))
    .fetch_one(repo.pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn progress_writes_are_stamped_by_the_store_clock() {
    let repo = connect("memdb_updated_at").await;
    let storage = Storage::from_repository(repo.clone());
    let user = UserId::random();
    let later = fixed_now() + chrono::Duration::hours(2);

    storage
        .remote_progress(user, Clock::fixed(fixed_now()))
        .record_attempt(key(1, 1), score(70.0))
        .await
        .unwrap();
    assert_eq!(updated_at(&repo, user, key(1, 1)).await, fixed_now());

    let store = storage.remote_progress(user, Clock::fixed(later));
    store.unlock(key(1, 1)).await.unwrap();
    store.unlock(key(1, 2)).await.unwrap();
    assert_eq!(updated_at(&repo, user, key(1, 1)).await, later);
    assert_eq!(updated_at(&repo, user, key(1, 2)).await, later);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_on_a_file_database_keep_the_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("quest.sqlite3").display());
    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(mode, "wal");

    let user = UserId::random();
    let mut tasks = Vec::new();
    for percent in [35.0, 90.0, 10.0, 72.5, 88.0, 5.0, 60.0, 89.9] {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            repo.record_user_attempt(user, key(1, 1), score(percent), fixed_now())
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = repo.get_user_progress(user, key(1, 1)).await.unwrap().unwrap();
    assert!(stored.is_unlocked);
    assert_eq!(stored.highest_score, score(90.0));
}
