use thiserror::Error;

use crate::model::ids::{CategoryId, StageNumber};

/// Stage that is playable without any prior progress when a category does not
/// name one.
pub const DEFAULT_INITIAL_STAGE: StageNumber = StageNumber::new(1);

/// Highest stage a submission can unlock when a category does not set its own
/// ceiling.
pub const DEFAULT_MAX_STAGE: StageNumber = StageNumber::new(20);

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CategoryError {
    #[error("category name cannot be empty")]
    EmptyName,

    #[error("stage numbers start at 1")]
    ZeroStage,

    #[error("initial stage {initial} is beyond the category ceiling {max_stage}")]
    InitialBeyondCeiling {
        initial: StageNumber,
        max_stage: StageNumber,
    },
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// A themed group of stages.
///
/// Carries its own unlock configuration: the stage that is open by default and
/// the ceiling above which submissions stop unlocking further stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
    order: i32,
    initial_stage: StageNumber,
    max_stage: StageNumber,
}

impl Category {
    /// Creates a validated category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryError` if the name is blank, a stage number is zero, or
    /// the initial stage lies above `max_stage`.
    pub fn new(
        id: CategoryId,
        name: impl Into<String>,
        description: Option<String>,
        order: i32,
        initial_stage: StageNumber,
        max_stage: StageNumber,
    ) -> Result<Self, CategoryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CategoryError::EmptyName);
        }
        if initial_stage.value() == 0 || max_stage.value() == 0 {
            return Err(CategoryError::ZeroStage);
        }
        if initial_stage > max_stage {
            return Err(CategoryError::InitialBeyondCeiling {
                initial: initial_stage,
                max_stage,
            });
        }

        Ok(Self {
            id,
            name,
            description: description.filter(|d| !d.trim().is_empty()),
            order,
            initial_stage,
            max_stage,
        })
    }

    /// Creates a category using the default initial stage and ceiling.
    ///
    /// # Errors
    ///
    /// Returns `CategoryError::EmptyName` if the name is blank.
    pub fn with_defaults(
        id: CategoryId,
        name: impl Into<String>,
        order: i32,
    ) -> Result<Self, CategoryError> {
        Self::new(id, name, None, order, DEFAULT_INITIAL_STAGE, DEFAULT_MAX_STAGE)
    }

    #[must_use]
    pub fn id(&self) -> CategoryId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub fn initial_stage(&self) -> StageNumber {
        self.initial_stage
    }

    #[must_use]
    pub fn max_stage(&self) -> StageNumber {
        self.max_stage
    }

    #[must_use]
    pub fn is_initial(&self, stage: StageNumber) -> bool {
        stage == self.initial_stage
    }
}
