//! Authentication service.
//!
//! Password registration and login, followed by TOTP two-factor enrollment
//! or verification.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use cartwheel_core::{Email, UserId, Username};

use crate::db::{AccountStore, RepositoryError};
use crate::models::user::{NewUser, User};
use crate::services::otp::{self, OtpGuard};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw registration form input.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirm: &'a str,
}

/// Where a freshly authenticated user goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// No TOTP secret yet: show the enrollment page.
    EnrollTwoFactor,
    /// A secret exists: ask for the current code.
    VerifyTwoFactor,
}

/// Authentication service.
pub struct AuthService<'a, S> {
    users: &'a S,
}

impl<'a, S: AccountStore> AuthService<'a, S> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a S) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns a validation variant (`InvalidUsername`, `InvalidEmail`,
    /// `PasswordMismatch`, `WeakPassword`, `UsernameTaken`, `EmailTaken`) if the
    /// input is rejected; no account is created in that case.
    #[instrument(skip_all, fields(username = %form.username))]
    pub async fn register(&self, form: Registration<'_>) -> Result<User, AuthError> {
        let username = Username::parse(form.username)?;
        let email = Email::parse(form.email)?;

        if form.password != form.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(form.password)?;

        if self.users.username_taken(&username).await? {
            return Err(AuthError::UsernameTaken);
        }
        if self.users.email_taken(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(form.password)?;

        // The unique constraints still decide races between the checks above
        // and the insert.
        let user = self
            .users
            .create_user(&NewUser {
                username,
                email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(field) if field == "email" => AuthError::EmailTaken,
                RepositoryError::Conflict(_) => AuthError::UsernameTaken,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// and `AuthError::AccountDisabled` for inactive accounts.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, LoginOutcome), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let password_hash = self
            .users
            .password_hash(user.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let outcome = if user.has_two_factor() {
            LoginOutcome::VerifyTwoFactor
        } else {
            LoginOutcome::EnrollTwoFactor
        };

        tracing::info!(user_id = %user.id, ?outcome, "Password login succeeded");
        Ok((user, outcome))
    }

    // =========================================================================
    // Two-Factor Authentication
    // =========================================================================

    /// Generate and persist a new TOTP secret for the user.
    ///
    /// Any previous secret stops working.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user no longer exists.
    #[instrument(skip(self))]
    pub async fn generate_otp(&self, user_id: UserId) -> Result<String, AuthError> {
        let secret = otp::random_secret();
        self.users
            .set_otp_secret(user_id, &secret)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })?;

        tracing::info!("Two-factor secret generated");
        Ok(secret)
    }

    /// Verify a TOTP code for the user at the current time.
    ///
    /// # Errors
    ///
    /// See [`AuthService::verify_otp_at`].
    pub async fn verify_otp(
        &self,
        user_id: UserId,
        code: &str,
        guard: &OtpGuard,
    ) -> Result<(), AuthError> {
        self.verify_otp_at(user_id, code, guard, otp::unix_now())
            .await
    }

    /// Verify a TOTP code for the user at `unix_secs`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TooManyAttempts` while the user is locked out,
    /// `AuthError::TwoFactorNotEnrolled` if no secret is set and
    /// `AuthError::InvalidOtp` for a wrong code.
    #[instrument(skip(self, code, guard))]
    pub async fn verify_otp_at(
        &self,
        user_id: UserId,
        code: &str,
        guard: &OtpGuard,
        unix_secs: u64,
    ) -> Result<(), AuthError> {
        if guard.is_locked(user_id).await {
            tracing::warn!("Two-factor verification refused: locked out");
            return Err(AuthError::TooManyAttempts);
        }

        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let secret = user.otp_secret.ok_or(AuthError::TwoFactorNotEnrolled)?;

        if otp::verify(&secret, code, unix_secs)? {
            guard.reset(user_id).await;
            tracing::info!("Two-factor code verified");
            Ok(())
        } else {
            let failures = guard.record_failure(user_id).await;
            tracing::warn!(failures, "Two-factor code rejected");
            Err(AuthError::InvalidOtp)
        }
    }
}

// =============================================================================
// Password Helpers
// =============================================================================

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
