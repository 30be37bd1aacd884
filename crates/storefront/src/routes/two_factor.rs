//! Two-factor (TOTP) route handlers.
//!
//! Reached after the password step. Enrollment shows a fresh secret and posts
//! its first code to the same verification handler that completes sign-in.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::{AccountStore, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireLogin, set_current_user};
use crate::models::CurrentUser;
use crate::routes::MessageQuery;
use crate::services::auth::{AuthError, AuthService};
use crate::services::otp;
use crate::state::AppState;

/// Code entry form.
#[derive(Debug, Deserialize)]
pub struct TwoFactorForm {
    pub otp: String,
}

/// Code entry page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/two_factor.html")]
pub struct TwoFactorTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<String>,
}

/// Enrollment page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/enable_two_factor.html")]
pub struct EnableTwoFactorTemplate {
    pub user: Option<CurrentUser>,
    pub otp_secret: String,
    pub provisioning_uri: String,
    pub qr_code_url: String,
}

/// Display the code entry page.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn verify_page(
    State(state): State<AppState>,
    RequireLogin(user): RequireLogin,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    if user.two_factor_verified {
        return Ok(Redirect::to("/").into_response());
    }

    let users = UserRepository::new(state.pool());
    let enrolled = users
        .find_user(user.id)
        .await?
        .is_some_and(|u| u.has_two_factor());
    if !enrolled {
        return Ok(Redirect::to("/two-factor/setup").into_response());
    }

    Ok(TwoFactorTemplate {
        user: Some(user),
        error: query.error_message(),
    }
    .into_response())
}

/// Verify a submitted code and complete sign-in.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn verify(
    State(state): State<AppState>,
    session: Session,
    RequireLogin(mut user): RequireLogin,
    Form(form): Form<TwoFactorForm>,
) -> Result<Response> {
    let users = UserRepository::new(state.pool());
    let result = AuthService::new(&users)
        .verify_otp(user.id, form.otp.trim(), state.otp_guard())
        .await;

    match result {
        Ok(()) => {
            user.two_factor_verified = true;
            set_current_user(&session, &user).await?;
            Ok(Redirect::to("/?success=verified").into_response())
        }
        Err(AuthError::TwoFactorNotEnrolled) => {
            Ok(Redirect::to("/two-factor/setup").into_response())
        }
        Err(AuthError::TooManyAttempts) => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            TwoFactorTemplate {
                user: Some(user),
                error: Some("Too many incorrect codes, try again in a few minutes".to_string()),
            },
        )
            .into_response()),
        Err(e @ AuthError::InvalidOtp) => Ok((
            StatusCode::UNAUTHORIZED,
            TwoFactorTemplate {
                user: Some(user),
                error: Some(AppError::from(e).public_message()),
            },
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Generate a new secret and show the enrollment page.
///
/// A user who already holds a secret but has not passed the code check is
/// sent to verification instead, so a stolen password cannot re-enroll.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn setup_page(
    State(state): State<AppState>,
    RequireLogin(user): RequireLogin,
) -> Result<Response> {
    let users = UserRepository::new(state.pool());
    let Some(account) = users.find_user(user.id).await? else {
        return Err(AppError::AuthenticationFailed(
            "Please sign in again".to_string(),
        ));
    };

    if account.has_two_factor() && !user.two_factor_verified {
        return Ok(Redirect::to("/two-factor").into_response());
    }

    let otp_secret = AuthService::new(&users).generate_otp(user.id).await?;
    let provisioning_uri = otp::provisioning_uri(
        &state.config().otp.issuer,
        account.email.as_str(),
        &otp_secret,
    );
    let qr_code_url = otp::qr_code_url(&provisioning_uri);

    Ok((
        StatusCode::OK,
        [("cache-control", "no-store")],
        EnableTwoFactorTemplate {
            user: Some(user),
            otp_secret,
            provisioning_uri,
            qr_code_url,
        },
    )
        .into_response())
}
