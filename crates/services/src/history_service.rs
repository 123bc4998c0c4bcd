use std::sync::Arc;
use std::time::Duration;

use quest_core::model::{QuizResult, UserId};
use storage::repository::{QuizResultRepository, StorageError};

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::timeout::bounded;

/// Most results returned for one profile.
pub const HISTORY_LIMIT: u32 = 100;

/// Quiz attempts recorded for signed-in users.
#[derive(Clone)]
pub struct HistoryService {
    store_timeout: Duration,
    results: Arc<dyn QuizResultRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn QuizResultRepository>) -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            results,
        }
    }

    #[must_use]
    pub fn with_store_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }

    /// The user's results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the results cannot be read.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<QuizResult>, StorageError> {
        bounded(
            self.store_timeout,
            self.results.results_for_user(user_id, HISTORY_LIMIT),
        )
        .await
    }
}
