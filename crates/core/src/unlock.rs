//! Rules deciding which stages of a category a player may enter.

use crate::model::{Category, StageNumber, StageProgress};

/// Whether `stage` is playable given its stored progress.
///
/// The category's initial stage is always open; every other stage needs a
/// stored record with `is_unlocked` set.
#[must_use]
pub fn is_unlocked(category: &Category, stage: StageNumber, progress: Option<&StageProgress>) -> bool {
    category.is_initial(stage) || progress.is_some_and(|p| p.is_unlocked)
}

/// The stage a successful submission of `stage` opens, if any.
///
/// Nothing is unlocked once `stage` has reached the category ceiling.
#[must_use]
pub fn next_stage_to_unlock(category: &Category, stage: StageNumber) -> Option<StageNumber> {
    if stage < category.max_stage() {
        stage.next()
    } else {
        None
    }
}
