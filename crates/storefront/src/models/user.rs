//! User domain types.

use chrono::{DateTime, Utc};

use cartwheel_core::{Email, UserId, Username};

/// A storefront account.
///
/// The password hash is deliberately not part of this type; it is fetched
/// separately through [`crate::db::AccountStore::password_hash`] during login.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique display name.
    pub username: Username,
    /// Unique email address, used to sign in.
    pub email: Email,
    /// Inactive accounts cannot sign in.
    pub is_active: bool,
    /// Base32 TOTP secret, set once two-factor enrollment has started.
    pub otp_secret: Option<String>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the user has a TOTP secret on file.
    #[must_use]
    pub const fn has_two_factor(&self) -> bool {
        self.otp_secret.is_some()
    }
}

/// Data needed to insert a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
}
