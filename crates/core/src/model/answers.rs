use std::collections::HashMap;

use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::Question;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("option {option} does not exist on question {question} ({len} options)")]
    OptionOutOfRange {
        question: QuestionId,
        option: usize,
        len: usize,
    },
}

/// The options a player picked while working through a stage.
///
/// Questions without an entry, or whose entry is `None`, are unanswered and
/// score as incorrect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSheet {
    selections: HashMap<QuestionId, Option<usize>>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sheet with every question present and unanswered.
    #[must_use]
    pub fn seeded(questions: &[Question]) -> Self {
        Self {
            selections: questions.iter().map(|q| (q.id(), None)).collect(),
        }
    }

    /// Builds a sheet from raw selections where any negative index (the `-1`
    /// sentinel) means "not answered".
    #[must_use]
    pub fn from_raw(raw: impl IntoIterator<Item = (QuestionId, i64)>) -> Self {
        let mut sheet = Self::new();
        for (id, value) in raw {
            sheet.set_raw(id, value);
        }
        sheet
    }

    /// Selects `option` for `question`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::OptionOutOfRange` if the question has no such option.
    pub fn select(&mut self, question: &Question, option: usize) -> Result<(), AnswerError> {
        let len = question.options().len();
        if option >= len {
            return Err(AnswerError::OptionOutOfRange {
                question: question.id(),
                option,
                len,
            });
        }
        self.selections.insert(question.id(), Some(option));
        Ok(())
    }

    /// Records a raw selection; negative values clear the answer.
    pub fn set_raw(&mut self, question: QuestionId, value: i64) {
        let selected = usize::try_from(value).ok();
        self.selections.insert(question, selected);
    }

    pub fn clear(&mut self, question: QuestionId) {
        self.selections.insert(question, None);
    }

    #[must_use]
    pub fn selected(&self, question: QuestionId) -> Option<usize> {
        self.selections.get(&question).copied().flatten()
    }

    /// Number of questions with an option picked.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selections.values().filter(|s| s.is_some()).count()
    }
}
