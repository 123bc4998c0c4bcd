//! Device-local identity provider for the command line.
//!
//! The signed-in account id is kept next to the guest progress, under its own
//! key, so `login` survives between invocations.

use std::sync::Arc;

use async_trait::async_trait;
use quest_core::model::UserId;
use services::{AuthError, IdentityProvider};
use storage::KeyValueStore;

pub const SESSION_KEY: &str = "session_user";

pub struct LocalSessionProvider {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalSessionProvider {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Remember `user_id` as the signed-in account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the session cannot be written.
    pub fn sign_in(&self, user_id: UserId) -> Result<(), AuthError> {
        self.kv
            .set(SESSION_KEY, &user_id.to_string())
            .map_err(|e| AuthError::Provider(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for LocalSessionProvider {
    async fn current_user(&self) -> Result<Option<UserId>, AuthError> {
        let Some(raw) = self
            .kv
            .get(SESSION_KEY)
            .map_err(|e| AuthError::Provider(e.to_string()))?
        else {
            return Ok(None);
        };
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|e| AuthError::Provider(format!("corrupt session: {e}")))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.kv
            .remove(SESSION_KEY)
            .map_err(|e| AuthError::Provider(e.to_string()))
    }
}
