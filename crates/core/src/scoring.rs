//! Scoring of a submitted answer sheet against a stage's questions.

use crate::error::InvalidStageError;
use crate::model::{AnswerSheet, Question, QuestionId, Score};

/// Per-question outcome shown after a stage is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub selected: Option<usize>,
    pub correct_index: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// Correct count, question count and resulting score for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
    pub score: Score,
}

/// Counts correct answers and derives the score.
///
/// # Errors
///
/// Returns `InvalidStageError::NoQuestions` when `questions` is empty.
pub fn tally(questions: &[Question], answers: &AnswerSheet) -> Result<Tally, InvalidStageError> {
    let total = questions.len();
    let correct = questions
        .iter()
        .filter(|q| q.is_correct(answers.selected(q.id())))
        .count();
    let score = Score::from_ratio(correct, total)?;
    Ok(Tally {
        correct,
        total,
        score,
    })
}

/// `round1(correct / total * 100)`; unanswered questions count as wrong.
///
/// # Errors
///
/// Returns `InvalidStageError::NoQuestions` when `questions` is empty.
pub fn compute_score(questions: &[Question], answers: &AnswerSheet) -> Result<Score, InvalidStageError> {
    tally(questions, answers).map(|t| t.score)
}

/// Marks each question right or wrong, in question order.
#[must_use]
pub fn grade_answers(questions: &[Question], answers: &AnswerSheet) -> Vec<GradedAnswer> {
    questions
        .iter()
        .map(|q| {
            let selected = answers.selected(q.id());
            GradedAnswer {
                question_id: q.id(),
                selected,
                correct_index: q.correct_index(),
                is_correct: q.is_correct(selected),
                explanation: q.explanation().map(str::to_owned),
            }
        })
        .collect()
}
