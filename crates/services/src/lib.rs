#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod catalog_service;
pub mod config;
pub mod error;
pub mod history_service;
pub mod progress_service;
mod timeout;

pub use quest_core::Clock;

pub use app_services::AppServices;
pub use auth::{AuthEvent, AuthSession, AuthState, IdentityProvider};
pub use catalog_service::CatalogService;
pub use config::EngineConfig;
pub use error::{
    AppServicesError, AuthError, CatalogError, ConfigError, PersistenceOp, ProgressError,
    StoreKind,
};
pub use history_service::HistoryService;
pub use progress_service::{MergeReport, ProgressService, StageStatus, SubmitOutcome};
