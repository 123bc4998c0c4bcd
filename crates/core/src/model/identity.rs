use crate::model::ids::UserId;

/// Who a progress operation acts for.
///
/// Guests keep progress on the local device; users keep it in the persistent
/// store under their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Guest,
    User(UserId),
}

impl Identity {
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Identity::Guest => None,
            Identity::User(id) => Some(*id),
        }
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }
}
