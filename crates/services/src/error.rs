//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use quest_core::InvalidStageError;
use quest_core::model::{CategoryId, StageNumber};
use storage::repository::{ProgressStoreKind, StorageError};
use storage::sqlite::SqliteInitError;

/// Which store a failed persistence call was talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Guest,
    Remote,
    Catalog,
    Results,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Guest => "guest",
            StoreKind::Remote => "remote",
            StoreKind::Catalog => "catalog",
            StoreKind::Results => "results",
        };
        f.write_str(name)
    }
}

impl From<ProgressStoreKind> for StoreKind {
    fn from(kind: ProgressStoreKind) -> Self {
        match kind {
            ProgressStoreKind::Guest => StoreKind::Guest,
            ProgressStoreKind::Remote => StoreKind::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceOp {
    Read,
    Write,
}

impl fmt::Display for PersistenceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceOp::Read => f.write_str("read"),
            PersistenceOp::Write => f.write_str("write"),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    InvalidStage(#[from] InvalidStageError),

    #[error("{store} store {op} failed: {source}")]
    Persistence {
        store: StoreKind,
        op: PersistenceOp,
        #[source]
        source: StorageError,
    },

    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("stage {stage} of category {category} not found")]
    StageNotFound {
        category: CategoryId,
        stage: StageNumber,
    },

    #[error("merged {merged} guest records, {failed} left in the guest store: {source}")]
    MergeIncomplete {
        merged: usize,
        failed: usize,
        #[source]
        source: StorageError,
    },
}

impl ProgressError {
    pub(crate) fn persistence(
        store: impl Into<StoreKind>,
        op: PersistenceOp,
    ) -> impl FnOnce(StorageError) -> Self {
        let store = store.into();
        move |source| ProgressError::Persistence { store, op, source }
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AuthSession` and identity providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("identity provider failed: {0}")]
    Provider(String),
    #[error("guest progress merge failed: {0}")]
    Merge(#[from] ProgressError),
}

/// Errors raised while reading `EngineConfig` from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} cannot be empty")]
    Empty { var: &'static str },
    #[error("invalid {var} value: {raw}")]
    Invalid { var: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
