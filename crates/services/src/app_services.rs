use std::sync::Arc;
use std::time::Duration;

use storage::kv::{FileKeyValueStore, KeyValueStore};
use storage::repository::Storage;
use storage::GuestProgressStore;

use crate::Clock;
use crate::auth::{AuthSession, IdentityProvider};
use crate::catalog_service::CatalogService;
use crate::config::EngineConfig;
use crate::error::AppServicesError;
use crate::history_service::HistoryService;
use crate::progress_service::ProgressService;

/// Assembles app-facing services over one persistent store and one guest
/// store.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    catalog: Arc<CatalogService>,
    progress: Arc<ProgressService>,
    history: Arc<HistoryService>,
}

impl AppServices {
    /// Build services backed by `SQLite` and a guest directory on disk.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn from_config(config: &EngineConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.database_url).await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(config.guest_dir.clone()));
        tracing::info!(
            database_url = %config.database_url,
            guest_dir = %config.guest_dir.display(),
            "storage ready"
        );
        Ok(Self::new(storage, kv, clock, config.store_timeout))
    }

    #[must_use]
    pub fn new(
        storage: Storage,
        guest_kv: Arc<dyn KeyValueStore>,
        clock: Clock,
        store_timeout: Duration,
    ) -> Self {
        let catalog = Arc::new(
            CatalogService::new(Arc::clone(&storage.catalog)).with_store_timeout(store_timeout),
        );
        let progress = Arc::new(
            ProgressService::new(
                clock,
                Arc::clone(&storage.catalog),
                Arc::clone(&storage.progress),
                Arc::clone(&storage.results),
                GuestProgressStore::new(guest_kv),
            )
            .with_store_timeout(store_timeout),
        );
        let history = Arc::new(
            HistoryService::new(Arc::clone(&storage.results)).with_store_timeout(store_timeout),
        );

        Self {
            storage,
            catalog,
            progress,
            history,
        }
    }

    /// Raw repositories, for seeding and administration.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    /// A signed-out session bound to `provider`.
    #[must_use]
    pub fn auth_session(&self, provider: Arc<dyn IdentityProvider>) -> AuthSession {
        AuthSession::new(provider, self.progress())
    }
}
