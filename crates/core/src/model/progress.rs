use serde::{Deserialize, Serialize};

use crate::model::ids::{CategoryId, StageNumber};
use crate::model::score::Score;

/// Addresses one stage of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressKey {
    pub category_id: CategoryId,
    pub stage_number: StageNumber,
}

impl ProgressKey {
    #[must_use]
    pub fn new(category_id: CategoryId, stage_number: StageNumber) -> Self {
        Self {
            category_id,
            stage_number,
        }
    }

    /// Key for the following stage of the same category.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.stage_number
            .next()
            .map(|stage_number| Self::new(self.category_id, stage_number))
    }
}

/// Stored progress for a single stage.
///
/// `highest_score` only ever moves up: every transition takes the maximum of
/// the stored and incoming values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageProgress {
    pub is_unlocked: bool,
    pub highest_score: Score,
}

impl StageProgress {
    /// Progress for a stage that was just unlocked but never played.
    #[must_use]
    pub fn unlocked() -> Self {
        Self {
            is_unlocked: true,
            highest_score: Score::ZERO,
        }
    }

    /// Applies a finished attempt: the stage is unlocked and the best score kept.
    #[must_use]
    pub fn with_attempt(self, score: Score) -> Self {
        Self {
            is_unlocked: true,
            highest_score: self.highest_score.max(score),
        }
    }

    /// Marks the stage unlocked, leaving the score untouched.
    #[must_use]
    pub fn with_unlock(self) -> Self {
        Self {
            is_unlocked: true,
            ..self
        }
    }
}

/// Progress for a stage together with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRecord {
    pub key: ProgressKey,
    pub progress: StageProgress,
}
