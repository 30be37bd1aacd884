//! Time-based one-time passwords (RFC 6238).
//!
//! Secrets are 160 random bits encoded as unpadded base32, the format
//! authenticator apps expect. Codes are HMAC-SHA1, 6 digits, 30-second step,
//! and only the current step is accepted.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use moka::future::Cache;
use thiserror::Error;
use totp_lite::{Sha1, totp_custom};

use cartwheel_core::UserId;

use crate::config::OtpConfig;

/// TOTP time step in seconds.
pub const STEP_SECONDS: u64 = 30;

/// Number of digits in a code.
pub const DIGITS: u32 = 6;

/// Secret size in bytes (160 bits).
const SECRET_BYTES: usize = 20;

/// Errors from OTP operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    /// The stored secret is not valid base32.
    #[error("invalid OTP secret")]
    InvalidSecret,
}

/// Generate a new random base32 secret.
#[must_use]
pub fn random_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::random();
    BASE32_NOPAD.encode(&bytes)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| OtpError::InvalidSecret)
}

/// The code for `secret` at `unix_secs`.
///
/// # Errors
///
/// Returns `OtpError::InvalidSecret` if the secret does not decode.
pub fn code_at(secret: &str, unix_secs: u64) -> Result<String, OtpError> {
    let key = decode_secret(secret)?;
    Ok(totp_custom::<Sha1>(STEP_SECONDS, DIGITS, &key, unix_secs))
}

/// Check `code` against `secret` at `unix_secs`.
///
/// Anything other than exactly six ASCII digits (surrounding whitespace
/// aside) is rejected without computing a code.
///
/// # Errors
///
/// Returns `OtpError::InvalidSecret` if the secret does not decode.
pub fn verify(secret: &str, code: &str, unix_secs: u64) -> Result<bool, OtpError> {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let expected = code_at(secret, unix_secs)?;
    Ok(constant_time_eq(expected.as_bytes(), code.as_bytes()))
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `otpauth://` URI for enrolling `account` in an authenticator app.
#[must_use]
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> String {
    let issuer = urlencoding::encode(issuer);
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}",
        account = urlencoding::encode(account),
    )
}

/// External QR image URL for a provisioning URI.
#[must_use]
pub fn qr_code_url(provisioning_uri: &str) -> String {
    format!(
        "https://api.qrserver.com/v1/create-qr-code/?data={}&size=200x200",
        urlencoding::encode(provisioning_uri)
    )
}

/// Per-user failed-attempt counter with lockout.
///
/// Counters expire `lockout` after the last failure; a user with
/// `max_failed_attempts` failures on record is locked out until then.
#[derive(Clone)]
pub struct OtpGuard {
    failures: Cache<UserId, u32>,
    max_failed_attempts: u32,
}

impl OtpGuard {
    /// Create a guard from configuration.
    #[must_use]
    pub fn new(config: &OtpConfig) -> Self {
        Self::with_limits(config.max_failed_attempts, config.lockout)
    }

    /// Create a guard with explicit limits.
    #[must_use]
    pub fn with_limits(max_failed_attempts: u32, lockout: Duration) -> Self {
        Self {
            failures: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(lockout)
                .build(),
            max_failed_attempts,
        }
    }

    /// Whether the user is currently locked out.
    pub async fn is_locked(&self, user_id: UserId) -> bool {
        self.failures
            .get(&user_id)
            .await
            .is_some_and(|count| count >= self.max_failed_attempts)
    }

    /// Record a failed attempt and return the new count.
    pub async fn record_failure(&self, user_id: UserId) -> u32 {
        self.failures
            .entry(user_id)
            .and_upsert_with(|existing| {
                let count = existing.map_or(0, |entry| entry.into_value());
                std::future::ready(count.saturating_add(1))
            })
            .await
            .into_value()
    }

    /// Clear the counter after a successful verification.
    pub async fn reset(&self, user_id: UserId) {
        self.failures.invalidate(&user_id).await;
    }
}

impl std::fmt::Debug for OtpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpGuard")
            .field("max_failed_attempts", &self.max_failed_attempts)
            .field("tracked_users", &self.failures.entry_count())
            .finish()
    }
}
