//! Snapshot of the session state

use rust_decimal::Decimal;

use super::types::User;

/// Session data as last confirmed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// The signed-in user, `None` when signed out
    pub user: Option<User>,

    /// Whether the start-up profile load is still running
    pub is_loading: bool,
}

impl Session {
    /// The state before `load()` has run
    pub fn initial() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }

    /// Check if a user is signed in
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Wallet balance from the last profile the server returned
    pub fn balance(&self) -> Option<Decimal> {
        self.user.as_ref().map(|user| user.balance)
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.username.as_str())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}
