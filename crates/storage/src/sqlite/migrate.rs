use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            initial_stage_number INTEGER NOT NULL DEFAULT 1 CHECK (initial_stage_number >= 1),
            max_stage INTEGER NOT NULL DEFAULT 20 CHECK (max_stage >= initial_stage_number)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS category_stages (
            category_id INTEGER NOT NULL,
            stage_number INTEGER NOT NULL CHECK (stage_number >= 1),
            title TEXT NOT NULL,
            description TEXT,
            PRIMARY KEY (category_id, stage_number),
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            category_id INTEGER NOT NULL,
            stage_number INTEGER NOT NULL,
            question TEXT NOT NULL,
            options TEXT NOT NULL,
            correct_index INTEGER NOT NULL CHECK (correct_index >= 0),
            explanation TEXT,
            FOREIGN KEY (category_id, stage_number)
                REFERENCES category_stages(category_id, stage_number) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_stage_progress (
            user_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            stage_number INTEGER NOT NULL CHECK (stage_number >= 1),
            is_unlocked INTEGER NOT NULL CHECK (is_unlocked IN (0, 1)),
            highest_score REAL NOT NULL CHECK (highest_score BETWEEN 0 AND 100),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, category_id, stage_number)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_results (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            stage_number INTEGER NOT NULL,
            score REAL NOT NULL CHECK (score BETWEEN 0 AND 100),
            total_questions INTEGER NOT NULL CHECK (total_questions > 0),
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_stage
            ON questions (category_id, stage_number, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_results_user_created
            ON quiz_results (user_id, created_at);
    ",
];

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates the catalog (categories, stages, questions), per-user
/// stage progress, and the quiz result log.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
