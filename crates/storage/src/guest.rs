//! Guest progress kept as one JSON document in a device-local key/value store.
//!
//! Document shape, keyed by category then stage:
//!
//! ```json
//! { "1": { "1": { "is_unlocked": true, "highest_score": 60.0 },
//!          "2": { "is_unlocked": true, "highest_score": 0.0 } } }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quest_core::model::{CategoryId, ProgressKey, ProgressRecord, Score, StageNumber, StageProgress};
use serde::{Deserialize, Serialize};

use crate::kv::{KeyValueError, KeyValueStore};
use crate::repository::{ProgressStore, ProgressStoreKind, StorageError};

/// Well-known key holding the whole guest document.
pub const GUEST_PROGRESS_KEY: &str = "guest_progress";

fn kv_err(err: KeyValueError) -> StorageError {
    StorageError::Connection(err.to_string())
}

/// In-memory form of the guest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestDocument(BTreeMap<CategoryId, BTreeMap<StageNumber, StageProgress>>);

impl GuestDocument {
    #[must_use]
    pub fn get(&self, key: ProgressKey) -> Option<StageProgress> {
        self.0
            .get(&key.category_id)
            .and_then(|stages| stages.get(&key.stage_number))
            .copied()
    }

    fn entry(&mut self, key: ProgressKey) -> &mut StageProgress {
        self.0
            .entry(key.category_id)
            .or_default()
            .entry(key.stage_number)
            .or_default()
    }

    fn remove(&mut self, key: ProgressKey) {
        if let Some(stages) = self.0.get_mut(&key.category_id) {
            stages.remove(&key.stage_number);
            if stages.is_empty() {
                self.0.remove(&key.category_id);
            }
        }
    }

    /// Records of one category, ordered by stage.
    #[must_use]
    pub fn category(&self, category_id: CategoryId) -> Vec<ProgressRecord> {
        self.0
            .get(&category_id)
            .into_iter()
            .flat_map(|stages| {
                stages.iter().map(move |(stage, progress)| ProgressRecord {
                    key: ProgressKey::new(category_id, *stage),
                    progress: *progress,
                })
            })
            .collect()
    }

    /// Every record, ordered by category then stage.
    #[must_use]
    pub fn records(&self) -> Vec<ProgressRecord> {
        self.0
            .keys()
            .flat_map(|category_id| self.category(*category_id))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `ProgressStore` for unauthenticated play.
///
/// Every operation is a read-modify-write of the whole document. Writers in
/// this process are serialized by a shared lock; other processes using the
/// same directory can still overwrite each other.
#[derive(Clone)]
pub struct GuestProgressStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl GuestProgressStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load the current document; a missing key is an empty document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored JSON is corrupt.
    pub fn load(&self) -> Result<GuestDocument, StorageError> {
        let Some(raw) = self.kv.get(GUEST_PROGRESS_KEY).map_err(kv_err)? else {
            return Ok(GuestDocument::default());
        };
        serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn save(&self, doc: &GuestDocument) -> Result<(), StorageError> {
        if doc.is_empty() {
            return self.kv.remove(GUEST_PROGRESS_KEY).map_err(kv_err);
        }
        let raw =
            serde_json::to_string(doc).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv.set(GUEST_PROGRESS_KEY, &raw).map_err(kv_err)
    }

    fn update<T>(&self, f: impl FnOnce(&mut GuestDocument) -> T) -> Result<T, StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut doc = self.load()?;
        let out = f(&mut doc);
        self.save(&doc)?;
        Ok(out)
    }

    /// Every stored guest record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read.
    pub fn records(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(self.load()?.records())
    }

    /// Drop records that still hold the given values, deleting the document
    /// once it is empty. Entries changed since `merged` was read are kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read or written.
    pub fn remove_merged(&self, merged: &[ProgressRecord]) -> Result<(), StorageError> {
        self.update(|doc| {
            for record in merged {
                if doc.get(record.key) == Some(record.progress) {
                    doc.remove(record.key);
                }
            }
        })
    }
}

#[async_trait]
impl ProgressStore for GuestProgressStore {
    fn kind(&self) -> ProgressStoreKind {
        ProgressStoreKind::Guest
    }

    async fn get_progress(&self, key: ProgressKey) -> Result<Option<StageProgress>, StorageError> {
        Ok(self.load()?.get(key))
    }

    async fn category_progress(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(self.load()?.category(category_id))
    }

    async fn record_attempt(
        &self,
        key: ProgressKey,
        score: Score,
    ) -> Result<StageProgress, StorageError> {
        self.update(|doc| {
            let entry = doc.entry(key);
            *entry = entry.with_attempt(score);
            *entry
        })
    }

    async fn unlock(&self, key: ProgressKey) -> Result<(), StorageError> {
        self.update(|doc| {
            let entry = doc.entry(key);
            *entry = entry.with_unlock();
        })
    }
}
