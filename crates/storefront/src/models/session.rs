//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use cartwheel_core::{Email, UserId, Username};

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Display name.
    pub username: Username,
    /// User's email address.
    pub email: Email,
    /// Whether a TOTP code has been verified in this session.
    #[serde(default)]
    pub two_factor_verified: bool,
}

impl From<&crate::models::user::User> for CurrentUser {
    fn from(user: &crate::models::user::User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            two_factor_verified: false,
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
