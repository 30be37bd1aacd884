//! Authentication route handlers.
//!
//! Handles registration, the password step of login and logout. The TOTP
//! step lives in [`super::two_factor`].

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

use crate::db::UserRepository;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::routes::MessageQuery;
use crate::services::auth::{AuthService, LoginOutcome, Registration};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<String>,
    pub success: Option<String>,
    pub email: String,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<String>,
    pub username: String,
    pub email: String,
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }

    RegisterTemplate {
        user: None,
        error: query.error_message(),
        username: String::new(),
        email: String::new(),
    }
    .into_response()
}

/// Handle registration form submission.
///
/// Validation failures re-render the form with the message and the
/// non-secret fields filled back in.
#[instrument(skip(state, user, form), fields(username = %form.username))]
pub async fn register(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let users = UserRepository::new(state.pool());
    let registration = Registration {
        username: &form.username,
        email: &form.email,
        password: &form.password,
        password_confirm: &form.password_confirm,
    };

    match AuthService::new(&users).register(registration).await {
        Ok(_) => Ok(Redirect::to("/login?success=registered").into_response()),
        Err(e) => match AppError::from(e) {
            AppError::ValidationFailed(message) => Ok((
                StatusCode::BAD_REQUEST,
                RegisterTemplate {
                    user: None,
                    error: Some(message),
                    username: form.username,
                    email: form.email,
                },
            )
                .into_response()),
            other => Err(other),
        },
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }

    LoginTemplate {
        user: None,
        error: query.error_message(),
        success: query.success_message(),
        email: String::new(),
    }
    .into_response()
}

/// Handle the password step of login.
///
/// On success the session holds a user whose two-factor check is still
/// outstanding; users without a secret are sent to enrollment.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let users = UserRepository::new(state.pool());
    let (user, outcome) = match AuthService::new(&users)
        .login(&form.email, &form.password)
        .await
    {
        Ok(found) => found,
        Err(e) => {
            return match AppError::from(e) {
                AppError::AuthenticationFailed(message) => Ok((
                    StatusCode::UNAUTHORIZED,
                    LoginTemplate {
                        user: None,
                        error: Some(message),
                        success: None,
                        email: form.email,
                    },
                )
                    .into_response()),
                other => Err(other),
            };
        }
    };

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let next = match outcome {
        LoginOutcome::EnrollTwoFactor => "/two-factor/setup",
        LoginOutcome::VerifyTwoFactor => "/two-factor",
    };
    Ok(Redirect::to(next).into_response())
}

/// Handle logout.
#[instrument(skip_all)]
pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/"))
}
