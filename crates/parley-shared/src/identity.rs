use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// The signed-in user as seen by a feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    /// Role label (e.g. `student`, `tutor`), used as the prefix of
    /// synthesized chat names
    pub role: String,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            role: role.into(),
        }
    }
}

/// Source of the current user's identity.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> CurrentUser;
}

/// Identity provider returning a fixed user
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub CurrentUser);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> CurrentUser {
        self.0.clone()
    }
}
