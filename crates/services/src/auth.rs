//! Explicit sign-in state threaded through engine calls.
//!
//! An `AuthSession` is owned by the caller. It asks an `IdentityProvider` who
//! is signed in, and on the guest-to-account transition it folds the guest's
//! local progress into the new account exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use quest_core::model::{Identity, UserId};

use crate::error::AuthError;
use crate::progress_service::{MergeReport, ProgressService};

/// External account system.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The account with a live session, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider cannot be reached.
    async fn current_user(&self) -> Result<Option<UserId>, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider rejects the request.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Guest,
    SignedIn(UserId),
}

/// Notifications pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut,
}

pub struct AuthSession {
    state: AuthState,
    provider: Arc<dyn IdentityProvider>,
    progress: Arc<ProgressService>,
}

impl AuthSession {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, progress: Arc<ProgressService>) -> Self {
        Self {
            state: AuthState::SignedOut,
            provider,
            progress,
        }
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The identity to pass to progress operations; `None` until the caller
    /// signs in or chooses guest play.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        match self.state {
            AuthState::SignedOut => None,
            AuthState::Guest => Some(Identity::Guest),
            AuthState::SignedIn(user_id) => Some(Identity::User(user_id)),
        }
    }

    /// Pick up an existing provider session. Leaves the state alone when the
    /// provider has none.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider cannot be queried.
    pub async fn restore(&mut self) -> Result<AuthState, AuthError> {
        if let Some(user_id) = self.provider.current_user().await? {
            self.state = AuthState::SignedIn(user_id);
            tracing::debug!(user_id = %user_id, "restored session");
        }
        Ok(self.state)
    }

    /// Start playing without an account. Has no effect while signed in.
    pub fn continue_as_guest(&mut self) -> Identity {
        if let AuthState::SignedIn(user_id) = self.state {
            return Identity::User(user_id);
        }
        self.state = AuthState::Guest;
        Identity::Guest
    }

    /// Apply a provider notification.
    ///
    /// A sign-in while playing as guest merges the guest progress into the
    /// account before the state changes; the report is returned. The state
    /// moves to `SignedIn` even when the merge fails, and the unmerged records
    /// stay in the guest store for `ProgressService::merge_guest_progress`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Merge` if the guest merge fails.
    pub async fn handle(&mut self, event: AuthEvent) -> Result<Option<MergeReport>, AuthError> {
        match event {
            AuthEvent::SignedIn(user_id) => {
                let was_guest = self.state == AuthState::Guest;
                let merge = if was_guest {
                    Some(self.progress.merge_guest_progress(user_id).await)
                } else {
                    None
                };
                self.state = AuthState::SignedIn(user_id);
                tracing::info!(user_id = %user_id, was_guest, "signed in");
                merge.transpose().map_err(AuthError::from)
            }
            AuthEvent::SignedOut => {
                self.state = AuthState::SignedOut;
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider rejects the sign-out; the
    /// local state is left unchanged in that case.
    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        self.state = AuthState::SignedOut;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use quest_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;
    use storage::{GuestProgressStore, MemoryKeyValueStore};

    #[derive(Default)]
    struct StaticProvider {
        user: Mutex<Option<UserId>>,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn current_user(&self) -> Result<Option<UserId>, AuthError> {
            Ok(*self.user.lock().unwrap())
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            *self.user.lock().unwrap() = None;
            Ok(())
        }
    }

    fn session(provider: Arc<StaticProvider>) -> AuthSession {
        let repo = InMemoryRepository::new();
        let progress = ProgressService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo),
            GuestProgressStore::new(Arc::new(MemoryKeyValueStore::new())),
        );
        AuthSession::new(provider, Arc::new(progress))
    }

    #[tokio::test]
    async fn starts_signed_out_without_identity() {
        let mut session = session(Arc::new(StaticProvider::default()));
        assert_eq!(session.restore().await.unwrap(), AuthState::SignedOut);
        assert_eq!(session.identity(), None);
        assert_eq!(session.continue_as_guest(), Identity::Guest);
        assert_eq!(session.identity(), Some(Identity::Guest));
    }

    #[tokio::test]
    async fn restore_picks_up_provider_session() {
        let user = UserId::random();
        let provider = Arc::new(StaticProvider {
            user: Mutex::new(Some(user)),
        });
        let mut session = session(Arc::clone(&provider));

        assert_eq!(session.restore().await.unwrap(), AuthState::SignedIn(user));
        assert_eq!(session.continue_as_guest(), Identity::User(user));

        session.sign_out().await.unwrap();
        assert_eq!(session.state(), AuthState::SignedOut);
        assert_eq!(provider.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_in_merges_only_from_guest() {
        let mut session = session(Arc::new(StaticProvider::default()));
        let user = UserId::random();

        session.continue_as_guest();
        let report = session.handle(AuthEvent::SignedIn(user)).await.unwrap();
        assert_eq!(report, Some(MergeReport { merged: 0 }));
        assert_eq!(session.identity(), Some(Identity::User(user)));

        let again = session.handle(AuthEvent::SignedIn(user)).await.unwrap();
        assert_eq!(again, None);

        session.handle(AuthEvent::SignedOut).await.unwrap();
        assert_eq!(session.identity(), None);
    }
}
