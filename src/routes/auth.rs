// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes.
//!
//! Handlers read the browser's cookies (and storage snapshot header) into an
//! [`HttpContext`], run the session operation against it, and answer with
//! whatever cookie and storage changes the operation made, on success and
//! on failure alike.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::client::HttpContext;
use crate::error::{AppError, Result};
use crate::models::{OAuthProvider, SessionInfo};
use crate::services::guard::{DASHBOARD_PATH, EMAIL_PENDING_PATH, LANDING_PATH};
use crate::services::{CallbackKind, LogoutOutcome, SessionContext, TabAuthState};
use crate::AppState;

/// Frontend page that opens from a password-recovery email.
pub const RESET_PASSWORD_PAGE: &str = "/reset-password";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/oauth/{provider}", get(oauth_start))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(current_session))
        .route("/auth/events", get(session_events))
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/resend-verification", post(resend_verification))
}

/// Attach the context's cookie and storage changes to a handler result.
fn respond<T: IntoResponse>(ctx: &HttpContext, result: Result<T>) -> Response {
    match result {
        Ok(body) => (ctx.response_headers(), body).into_response(),
        Err(e) => (ctx.response_headers(), e).into_response(),
    }
}

fn validate<T: Validate>(body: &T) -> Result<()> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Refuse requests another site started: they would replace or drop the
/// visitor's session. Non-browser clients send neither header.
fn require_same_site(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let fetch_site = headers.get("sec-fetch-site").and_then(|v| v.to_str().ok());
    if fetch_site == Some("cross-site") {
        return Err(AppError::Forbidden("cross-site request".to_string()));
    }
    match headers.get(header::ORIGIN) {
        Some(origin) => {
            let origin = origin.to_str().unwrap_or_default();
            if state.config.is_trusted_origin(origin) {
                Ok(())
            } else {
                Err(AppError::Forbidden(format!("untrusted origin {origin:?}")))
            }
        }
        None => Ok(()),
    }
}

/// Only same-site absolute paths are honoured as post-login targets.
///
/// Browsers read `\` as `/`, so `/\host` is as scheme-relative as `//host`.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if is_local_path(path) => path,
        _ => DASHBOARD_PATH,
    }
}

fn is_local_path(path: &str) -> bool {
    const ORIGIN: &str = "http://portal.invalid";

    let plain = |p: &str| {
        p.starts_with('/')
            && !p[1..].starts_with(&['/', '\\'][..])
            && !p.chars().any(|c| c == '\\' || c.is_control())
    };
    let decoded = urlencoding::decode(path).map(|d| d.into_owned()).unwrap_or_default();
    if !plain(path) || !plain(&decoded) {
        return false;
    }
    Url::parse(ORIGIN)
        .and_then(|base| base.join(path))
        .is_ok_and(|url| url.origin().ascii_serialization() == ORIGIN)
}

// ─── Password Sign-in / Sign-up ──────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 72))]
    pub password: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignInResponse {
    pub session: SessionInfo,
    pub redirect: String,
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<CredentialsRequest>,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = async {
        require_same_site(&state, &headers)?;
        validate(&body)?;
        let session = state
            .sessions
            .sign_in_with_password(&mut ctx, &body.email, &body.password)
            .await?;
        let redirect = if session.pending_verification() {
            EMAIL_PENDING_PATH
        } else {
            DASHBOARD_PATH
        };
        Ok::<_, AppError>(Json(SignInResponse {
            session: session.info(),
            redirect: redirect.to_string(),
        }))
    }
    .await;
    respond(&ctx, result)
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignUpResponse {
    pub user_id: String,
    pub confirmation_pending: bool,
    pub redirect: String,
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<CredentialsRequest>,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = async {
        require_same_site(&state, &headers)?;
        validate(&body)?;
        let outcome = state
            .sessions
            .sign_up(&mut ctx, &body.email, &body.password)
            .await?;
        let confirmation_pending = outcome
            .session
            .as_ref()
            .map(|s| s.pending_verification())
            .unwrap_or(true);
        Ok::<_, AppError>(Json(SignUpResponse {
            user_id: outcome.user_id,
            confirmation_pending,
            redirect: if confirmation_pending {
                EMAIL_PENDING_PATH
            } else {
                DASHBOARD_PATH
            }
            .to_string(),
        }))
    }
    .await;
    respond(&ctx, result)
}

// ─── OAuth ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OAuthStartResponse {
    /// Provider consent URL to navigate to.
    pub url: String,
    pub select_account: bool,
}

/// Start an OAuth sign-in.
///
/// Called with `fetch` so the storage snapshot header can travel; the page
/// applies the returned directive, then navigates to `url`.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = (|| {
        require_same_site(&state, &headers)?;
        let provider: OAuthProvider = provider.parse().map_err(AppError::BadRequest)?;
        let redirect = state.sessions.sign_in_with_oauth(&mut ctx, provider)?;
        Ok::<_, AppError>(Json(OAuthStartResponse {
            url: redirect.url,
            select_account: redirect.select_account,
        }))
    })();
    respond(&ctx, result)
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth / email-link callback: exchange the code and land on the target page.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);

    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "Provider returned an error to the callback"
        );
        let target = format!("{}?error={}", LANDING_PATH, urlencoding::encode(&error));
        return (ctx.response_headers(), Redirect::to(&target)).into_response();
    }
    let Some(code) = params.code else {
        return (ctx.response_headers(), Redirect::to("/?error=missing_code")).into_response();
    };

    let next = safe_next(params.next.as_deref());
    let kind = if next == RESET_PASSWORD_PAGE {
        CallbackKind::PasswordRecovery
    } else {
        CallbackKind::SignIn
    };

    let target = match state.sessions.complete_code_exchange(&mut ctx, &code, kind).await {
        Ok(session) if session.pending_verification() => EMAIL_PENDING_PATH.to_string(),
        Ok(_) => next.to_string(),
        Err(e) if e.is_network() => "/?error=service_unavailable".to_string(),
        Err(_) => "/?error=auth_callback".to_string(),
    };
    (ctx.response_headers(), Redirect::to(&target)).into_response()
}

// ─── Session ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub state: TabAuthState,
    pub session: Option<SessionInfo>,
}

async fn current_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = async {
        let session = state.sessions.get_current_session(&mut ctx).await?;
        let mut tab = SessionContext::new();
        let auth_state = tab.resolve(session.as_ref());
        Ok::<_, AppError>(Json(SessionResponse {
            state: auth_state,
            session: tab.session().cloned(),
        }))
    }
    .await;
    respond(&ctx, result)
}

/// Session-change stream for the signed-in identity.
async fn session_events(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response> {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let session = state
        .sessions
        .get_current_session(&mut ctx)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let rx = state.sessions.events().subscribe();
    let stream = event_stream(rx, session.user_id);
    Ok((
        ctx.response_headers(),
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

fn event_stream(
    rx: tokio::sync::broadcast::Receiver<crate::services::AuthEvent>,
    user_id: String,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.user_id == user_id => {
            let json = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event("auth").data(json)))
        }
        Ok(_) => None,
        // Lagged: tell the page to refetch its session from scratch.
        Err(_) => Some(Ok(Event::default().event("resync").data(""))),
    })
}

// ─── Logout ──────────────────────────────────────────────────

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar, headers: HeaderMap) -> Response {
    if let Err(e) = require_same_site(&state, &headers) {
        return e.into_response();
    }
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let mut tab = SessionContext::new();
    let outcome: LogoutOutcome = state.logout.logout(&mut ctx, &mut tab).await;
    (ctx.response_headers(), Json(outcome)).into_response()
}

// ─── Password Recovery / Verification ────────────────────────

#[derive(Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub ok: bool,
}

/// Always reports success for well-formed input so the response never
/// reveals whether an account exists. Outages still surface as 503.
async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<EmailRequest>,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = async {
        validate(&body)?;
        match state
            .sessions
            .request_password_reset(&mut ctx, &body.email, RESET_PASSWORD_PAGE)
            .await
        {
            Err(e) if e.is_network() => Err(AppError::from(e)),
            Err(e) => {
                tracing::info!(error = %e, "Password reset request refused by store");
                Ok(Json(AcceptedResponse { ok: true }))
            }
            Ok(()) => Ok(Json(AcceptedResponse { ok: true })),
        }
    }
    .await;
    respond(&ctx, result)
}

#[derive(Deserialize, Validate)]
pub struct NewPasswordRequest {
    #[validate(length(min = 6, max = 72))]
    pub password: String,
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<NewPasswordRequest>,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, &headers);
    let result = async {
        validate(&body)?;
        state
            .sessions
            .update_password(&mut ctx, &body.password)
            .await?;
        Ok::<_, AppError>(Json(AcceptedResponse { ok: true }))
    }
    .await;
    respond(&ctx, result)
}

async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<AcceptedResponse>> {
    validate(&body)?;
    match state.sessions.resend_verification(&body.email).await {
        Err(e) if e.is_network() => Err(e.into()),
        Err(e) => {
            tracing::info!(error = %e, "Verification resend refused by store");
            Ok(Json(AcceptedResponse { ok: true }))
        }
        Ok(()) => Ok(Json(AcceptedResponse { ok: true })),
    }
}
