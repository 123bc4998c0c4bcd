use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("score must be a percentage between 0 and 100, got {0}")]
    OutOfRange(f64),

    #[error("correct answers ({correct}) exceed question count ({total})")]
    TooManyCorrect { correct: usize, total: usize },

    #[error("score needs at least one question")]
    NoQuestions,
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Percentage of correctly answered questions, kept to one decimal place.
///
/// Stored as integer tenths of a percent (`0..=1000`) so comparisons and the
/// running maximum are exact. Serializes as a plain percentage number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(u16);

/// Scores at or above this percentage count as a pass.
pub const PASS_MARK: Score = Score(700);

impl Score {
    pub const ZERO: Score = Score(0);
    pub const PERFECT: Score = Score(1000);

    /// Builds a score from tenths of a percent.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` above 1000 tenths.
    pub fn from_tenths(tenths: u16) -> Result<Self, ScoreError> {
        if tenths > Self::PERFECT.0 {
            return Err(ScoreError::OutOfRange(f64::from(tenths) / 10.0));
        }
        Ok(Self(tenths))
    }

    /// Builds a score from a percentage, rounding to one decimal place.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` for non-finite values or values
    /// outside `0..=100`.
    pub fn from_percent(percent: f64) -> Result<Self, ScoreError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(ScoreError::OutOfRange(percent));
        }
        // Range checked above, so the rounded value fits in 0..=1000.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let tenths = (percent * 10.0).round() as u16;
        Ok(Self(tenths))
    }

    /// `correct / total * 100`, rounded half-up to one decimal place.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::NoQuestions` when `total` is zero and
    /// `ScoreError::TooManyCorrect` when `correct > total`.
    pub fn from_ratio(correct: usize, total: usize) -> Result<Self, ScoreError> {
        if total == 0 {
            return Err(ScoreError::NoQuestions);
        }
        if correct > total {
            return Err(ScoreError::TooManyCorrect { correct, total });
        }
        let correct = correct as u128;
        let total = total as u128;
        let tenths = (correct * 2000 + total) / (2 * total);
        // correct <= total bounds this to 1000.
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(tenths as u16))
    }

    #[must_use]
    pub fn tenths(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn as_percent(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    #[must_use]
    pub fn is_passing(self) -> bool {
        self >= PASS_MARK
    }
}

impl TryFrom<f64> for Score {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_percent(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.as_percent()
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({self})")
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}
