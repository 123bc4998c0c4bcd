use quest_core::model::{
    Category, CategoryId, ProgressKey, ProgressRecord, Question, QuestionId, QuizResult, Score,
    Stage, StageNumber, StageProgress, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn category_id_from_i64(v: i64) -> Result<CategoryId, StorageError> {
    Ok(CategoryId::new(i64_to_u64("category_id", v)?))
}

pub(crate) fn stage_from_i64(v: i64) -> Result<StageNumber, StorageError> {
    Ok(StageNumber::new(i64_to_u32("stage_number", v)?))
}

pub(crate) fn user_id_text(user_id: UserId) -> String {
    user_id.to_string()
}

pub(crate) fn score_from_f64(field: &'static str, v: f64) -> Result<Score, StorageError> {
    Score::from_percent(v).map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn map_category_row(row: &SqliteRow) -> Result<Category, StorageError> {
    let order: i64 = row.try_get("sort_order").map_err(ser)?;
    Category::new(
        category_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        i32::try_from(order).map_err(|_| ser(format!("invalid sort_order: {order}")))?,
        stage_from_i64(row.try_get("initial_stage_number").map_err(ser)?)?,
        stage_from_i64(row.try_get("max_stage").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_stage_row(row: &SqliteRow) -> Result<Stage, StorageError> {
    Ok(Stage::new(
        category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
        stage_from_i64(row.try_get("stage_number").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
    ))
}

/// Rebuilds a question; rows whose `correct_index` does not address one of the
/// stored options are rejected.
pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let correct_index: i64 = row.try_get("correct_index").map_err(ser)?;

    Question::new(
        QuestionId::new(i64_to_u64("question_id", row.try_get("id").map_err(ser)?)?),
        category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
        stage_from_i64(row.try_get("stage_number").map_err(ser)?)?,
        row.try_get::<String, _>("question").map_err(ser)?,
        options,
        usize::try_from(correct_index)
            .map_err(|_| ser(format!("invalid correct_index: {correct_index}")))?,
        row.try_get::<Option<String>, _>("explanation").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<StageProgress, StorageError> {
    Ok(StageProgress {
        is_unlocked: row.try_get::<i64, _>("is_unlocked").map_err(ser)? != 0,
        highest_score: score_from_f64(
            "highest_score",
            row.try_get("highest_score").map_err(ser)?,
        )?,
    })
}

pub(crate) fn map_progress_record_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    Ok(ProgressRecord {
        key: ProgressKey::new(
            category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
            stage_from_i64(row.try_get("stage_number").map_err(ser)?)?,
        ),
        progress: map_progress_row(row)?,
    })
}

pub(crate) fn map_quiz_result_row(row: &SqliteRow) -> Result<QuizResult, StorageError> {
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    Ok(QuizResult {
        id: row.try_get("id").map_err(ser)?,
        user_id: user_id.parse().map_err(ser)?,
        category_id: category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
        stage_number: stage_from_i64(row.try_get("stage_number").map_err(ser)?)?,
        score: score_from_f64("score", row.try_get("score").map_err(ser)?)?,
        total_questions: i64_to_u32(
            "total_questions",
            row.try_get("total_questions").map_err(ser)?,
        )?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
