#![forbid(unsafe_code)]

pub mod guest;
pub mod kv;
pub mod repository;
pub mod sqlite;

pub use guest::{GUEST_PROGRESS_KEY, GuestDocument, GuestProgressStore};
pub use kv::{FileKeyValueStore, KeyValueError, KeyValueStore, MemoryKeyValueStore};
pub use repository::{ProgressStore, ProgressStoreKind, RemoteProgressStore, Storage, StorageError};
