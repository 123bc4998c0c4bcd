//! Device-local key/value storage used for guest play.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyValueError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    #[error("key/value store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Synchronous string store scoped to one device profile.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `KeyValueError` if the value cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError>;

    /// # Errors
    ///
    /// Returns `KeyValueError` if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `KeyValueError` if the value exists but cannot be removed.
    fn remove(&self, key: &str) -> Result<(), KeyValueError>;
}

/// Process-local store, lost on exit.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError> {
        let guard = self.values.lock().map_err(|_| KeyValueError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError> {
        let mut guard = self.values.lock().map_err(|_| KeyValueError::Poisoned)?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KeyValueError> {
        let mut guard = self.values.lock().map_err(|_| KeyValueError::Poisoned)?;
        guard.remove(key);
        Ok(())
    }
}

/// Durable store keeping each key in its own file under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader sees either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KeyValueError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(KeyValueError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KeyValueError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
