use thiserror::Error;

use crate::model::{AnswerError, CategoryError, CategoryId, QuestionError, ScoreError, StageNumber};

/// A stage (or its catalog data) cannot be played or scored.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidStageError {
    #[error("stage has no questions")]
    NoQuestions,

    #[error("initial stage {initial} of category {category} is missing from its stages")]
    MissingInitialStage {
        category: CategoryId,
        initial: StageNumber,
    },

    #[error("malformed catalog data: {0}")]
    Malformed(String),
}

impl From<ScoreError> for InvalidStageError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::NoQuestions => Self::NoQuestions,
            other => Self::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidStage(#[from] InvalidStageError),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Score(#[from] ScoreError),
}
