use chrono::{DateTime, Utc};

use crate::model::ids::{CategoryId, StageNumber, UserId};
use crate::model::score::Score;

/// One submitted attempt by a signed-in user. Results are append-only and are
/// never consulted by the unlock rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResult {
    pub id: i64,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub stage_number: StageNumber,
    pub score: Score,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
}
