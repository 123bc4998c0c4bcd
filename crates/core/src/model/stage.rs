use crate::model::ids::{CategoryId, StageNumber};

/// Catalog entry for one stage of a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub category_id: CategoryId,
    pub stage_number: StageNumber,
    pub title: String,
    pub description: Option<String>,
}

impl Stage {
    #[must_use]
    pub fn new(
        category_id: CategoryId,
        stage_number: StageNumber,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            category_id,
            stage_number,
            title: title.into(),
            description,
        }
    }
}
