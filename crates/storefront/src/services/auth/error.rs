//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::otp::OtpError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] cartwheel_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] cartwheel_core::UsernameError),

    /// Username already registered.
    #[error("username is already taken")]
    UsernameTaken,

    /// Email already registered.
    #[error("email is already registered")]
    EmailTaken,

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account exists but has been deactivated.
    #[error("account is disabled")]
    AccountDisabled,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Two-factor verification attempted before enrollment.
    #[error("two-factor authentication is not set up")]
    TwoFactorNotEnrolled,

    /// Wrong one-time code.
    #[error("invalid one-time code")]
    InvalidOtp,

    /// Too many wrong codes; verification is locked for a while.
    #[error("too many failed attempts")]
    TooManyAttempts,

    /// OTP primitive error.
    #[error(transparent)]
    Otp(#[from] OtpError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
