// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth Session Manager.
//!
//! Owns the session lifecycle: reading the current session from the
//! client's cookies, every sign-in flow, refresh, remote sign-out and the
//! session-change events that go with them.
//!
//! Every sign-in flow scrubs the client's auth artifacts before the store
//! is contacted, so a new identity never starts on top of another one's
//! leftovers.

use super::artifacts::{ArtifactScrubber, FORCE_ACCOUNT_CHOOSER_KEY};
use super::events::{AuthEvent, AuthEventKind, SessionEvents, Subscription};
use super::tokens::{generate_code_verifier, inspect_access_token, pkce_challenge, Claims, TokenState};
use crate::client::{ClientContext, StorageArea};
use crate::config::Config;
use crate::error::AuthError;
use crate::models::{OAuthProvider, Session, SignOutScope};
use crate::store::{SessionStore, SignUpOutcome, StoreUser};
use chrono::{DateTime, Utc};

/// Path the store redirects back to after OAuth consent or an email link.
pub const CALLBACK_PATH: &str = "/auth/callback";

/// Auth cookies outlive the access token; refresh keeps the session going.
const SESSION_COOKIE_DAYS: i64 = 30;
const OAUTH_VERIFIER_MINUTES: i64 = 10;
/// Email links may be opened hours after they were requested.
const EMAIL_VERIFIER_HOURS: i64 = 24;

/// Where to send the browser to continue an OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirect {
    pub url: String,
    /// Account chooser was forced for this attempt.
    pub select_account: bool,
}

/// Which flow an authorization code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    SignIn,
    PasswordRecovery,
}

#[derive(Clone)]
pub struct AuthSessionManager {
    store: SessionStore,
    scrubber: ArtifactScrubber,
    events: SessionEvents,
    jwt_secret: Vec<u8>,
    public_url: String,
}

impl AuthSessionManager {
    pub fn new(config: &Config, store: SessionStore, events: SessionEvents) -> Self {
        Self {
            store,
            scrubber: ArtifactScrubber::new(config),
            events,
            jwt_secret: config.jwt_secret.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn scrubber(&self) -> &ArtifactScrubber {
        &self.scrubber
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Register a session-change listener; see [`SessionEvents::on_change`].
    pub fn on_session_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.events.on_change(callback)
    }

    /// Absolute callback URL, optionally carrying the page to land on.
    pub fn callback_url(&self, next: Option<&str>) -> String {
        match next {
            Some(next) => format!(
                "{}{}?next={}",
                self.public_url,
                CALLBACK_PATH,
                urlencoding::encode(next)
            ),
            None => format!("{}{}", self.public_url, CALLBACK_PATH),
        }
    }

    // ─── Current Session ─────────────────────────────────────────

    /// Session held by the client, refreshed if its access token expired.
    ///
    /// `Ok(None)` means anonymous: no cookie, a token the store no longer
    /// honours, or an expired token with no usable refresh token. Cookies
    /// the store has rejected are scrubbed so later requests skip the round
    /// trip. Transport failures are returned as errors so callers can fail
    /// closed.
    pub async fn get_current_session(
        &self,
        ctx: &mut dyn ClientContext,
    ) -> Result<Option<Session>, AuthError> {
        let names = self.scrubber.names();
        let Some(access_token) = ctx.cookie_value(&names.access) else {
            return Ok(None);
        };
        let refresh_token = ctx.cookie_value(&names.refresh);

        match inspect_access_token(&access_token, &self.jwt_secret) {
            TokenState::Valid(claims) => match self.store.get_user(&access_token).await {
                Ok(user) => Ok(Some(session_from_claims(
                    claims,
                    user,
                    access_token,
                    refresh_token,
                ))),
                Err(e) if e.is_network() => Err(e),
                Err(e) => {
                    tracing::debug!(subject = %claims.sub, error = %e, "Store no longer honours access token");
                    self.scrub(ctx, "revoked session");
                    Ok(None)
                }
            },
            TokenState::Expired(claims) => {
                let Some(refresh_token) = refresh_token else {
                    tracing::debug!(subject = %claims.sub, "Access token expired without refresh token");
                    return Ok(None);
                };
                match self.store.refresh_session(&refresh_token).await {
                    Ok(session) => {
                        self.persist_session(ctx, &session);
                        tracing::debug!(subject = %session.user_id, "Refreshed session");
                        self.publish(AuthEventKind::TokenRefreshed, &session);
                        Ok(Some(session))
                    }
                    Err(e) if e.is_network() => Err(e),
                    Err(e) => {
                        tracing::info!(subject = %claims.sub, error = %e, "Session refresh rejected");
                        self.scrub(ctx, "rejected refresh");
                        Ok(None)
                    }
                }
            }
            TokenState::Invalid => {
                tracing::debug!("Ignoring access token with bad signature or audience");
                Ok(None)
            }
        }
    }

    // ─── Sign-in Flows ───────────────────────────────────────────

    pub async fn sign_in_with_password(
        &self,
        ctx: &mut dyn ClientContext,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.scrub(ctx, "password sign-in");

        let session = self
            .store
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| match e {
                AuthError::InvalidCredentials | AuthError::EmailNotConfirmed => {
                    tracing::info!(error = %e, "Password sign-in refused")
                }
                _ => tracing::warn!(error = %e, "Password sign-in failed"),
            })?;

        self.persist_session(ctx, &session);
        tracing::info!(subject = %session.user_id, "Signed in with password");
        self.publish(AuthEventKind::SignedIn, &session);
        Ok(session)
    }

    /// Start an OAuth sign-in. The browser should be sent to the returned URL.
    ///
    /// Consumes the force-account-chooser flag: when set, the provider is
    /// asked to show its account picker and the flag is cleared.
    pub fn sign_in_with_oauth(
        &self,
        ctx: &mut dyn ClientContext,
        provider: OAuthProvider,
    ) -> Result<OAuthRedirect, AuthError> {
        self.scrub(ctx, "OAuth sign-in");

        let select_account = ctx
            .storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY)
            .is_some_and(|value| value == "true");
        if select_account {
            ctx.remove_storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY);
        }

        let challenge = self.start_pkce(ctx, time::Duration::minutes(OAUTH_VERIFIER_MINUTES))?;
        let url = self.store.authorize_url(
            provider,
            &self.callback_url(None),
            &challenge,
            select_account,
        );

        tracing::info!(provider = provider.as_str(), select_account, "Starting OAuth sign-in");
        Ok(OAuthRedirect {
            url,
            select_account,
        })
    }

    /// Finish an OAuth sign-in with the code from the callback URL.
    pub async fn complete_oauth(
        &self,
        ctx: &mut dyn ClientContext,
        code: &str,
    ) -> Result<Session, AuthError> {
        self.complete_code_exchange(ctx, code, CallbackKind::SignIn)
            .await
    }

    /// Finish a PKCE flow with the code from the callback URL.
    pub async fn complete_code_exchange(
        &self,
        ctx: &mut dyn ClientContext,
        code: &str,
        kind: CallbackKind,
    ) -> Result<Session, AuthError> {
        let verifier = ctx
            .cookie_value(&self.scrubber.names().verifier)
            .ok_or_else(|| AuthError::Rejected("missing PKCE code verifier".to_string()))?;

        // Also drops the verifier: codes are single use.
        self.scrub(ctx, "code exchange");

        let session = self
            .store
            .exchange_code(code, &verifier)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Code exchange failed"))?;

        self.persist_session(ctx, &session);
        let event = match kind {
            CallbackKind::SignIn => AuthEventKind::SignedIn,
            CallbackKind::PasswordRecovery => AuthEventKind::PasswordRecovery,
        };
        tracing::info!(subject = %session.user_id, ?kind, "Completed code exchange");
        self.publish(event, &session);
        Ok(session)
    }

    pub async fn sign_up(
        &self,
        ctx: &mut dyn ClientContext,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        self.scrub(ctx, "sign-up");

        let challenge = self.start_pkce(ctx, time::Duration::hours(EMAIL_VERIFIER_HOURS))?;
        let outcome = self
            .store
            .sign_up(email, password, &self.callback_url(None), &challenge)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Sign-up failed"))?;

        tracing::info!(subject = %outcome.user_id, immediate = outcome.session.is_some(), "Signed up");
        if let Some(session) = &outcome.session {
            self.persist_session(ctx, session);
            self.publish(AuthEventKind::SignedIn, session);
        }
        Ok(outcome)
    }

    // ─── Account Maintenance ─────────────────────────────────────

    /// Email a password-recovery link that lands on `next`.
    pub async fn request_password_reset(
        &self,
        ctx: &mut dyn ClientContext,
        email: &str,
        next: &str,
    ) -> Result<(), AuthError> {
        let challenge = self.start_pkce(ctx, time::Duration::hours(EMAIL_VERIFIER_HOURS))?;
        self.store
            .recover(email, &self.callback_url(Some(next)), &challenge)
            .await?;
        tracing::info!("Password recovery email requested");
        Ok(())
    }

    pub async fn update_password(
        &self,
        ctx: &mut dyn ClientContext,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let session = self
            .get_current_session(ctx)
            .await?
            .ok_or(AuthError::AlreadyLoggedOut)?;

        let user = self
            .store
            .update_password(&session.access_token, new_password)
            .await?;

        let session = Session {
            email_confirmed: user.email_confirmed(),
            email: user.email.or(session.email),
            ..session
        };
        tracing::info!(subject = %session.user_id, "Password updated");
        self.publish(AuthEventKind::UserUpdated, &session);
        Ok(())
    }

    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        self.store
            .resend_signup(email, &self.callback_url(None))
            .await
    }

    // ─── Sign-out ────────────────────────────────────────────────

    /// Revoke the session behind `access_token` at the store.
    ///
    /// `AlreadyLoggedOut` is returned as-is; the caller decides whether it
    /// matters. Either way the identity is reported signed out.
    pub async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), AuthError> {
        let subject = match inspect_access_token(access_token, &self.jwt_secret) {
            TokenState::Valid(claims) | TokenState::Expired(claims) => Some(claims.sub),
            TokenState::Invalid => None,
        };

        let result = self.store.sign_out(access_token, scope).await;
        match (&result, &subject) {
            (Ok(()) | Err(AuthError::AlreadyLoggedOut), Some(subject)) => {
                tracing::info!(subject = %subject, scope = scope.as_str(), "Signed out");
                self.events.publish(AuthEvent::signed_out(subject));
            }
            (Err(e), _) if e.is_network() => {
                tracing::warn!(error = %e, "Remote sign-out failed");
            }
            _ => {}
        }
        result
    }

    // ─── Internals ───────────────────────────────────────────────

    fn scrub(&self, ctx: &mut dyn ClientContext, reason: &'static str) {
        let report = self.scrubber.scrub(ctx);
        if !report.cookies.is_empty() || !report.storage.is_empty() {
            tracing::debug!(
                cookies = ?report.cookies,
                storage_keys = report.storage.len(),
                reason,
                "Scrubbed auth artifacts"
            );
        }
    }

    /// Store a fresh code verifier in the client and return its challenge.
    fn start_pkce(
        &self,
        ctx: &mut dyn ClientContext,
        lifetime: time::Duration,
    ) -> Result<String, AuthError> {
        let verifier = generate_code_verifier()
            .map_err(|e| AuthError::Rejected(format!("PKCE setup failed: {}", e)))?;
        let name = &self.scrubber.names().verifier;
        ctx.set_cookie(self.scrubber.auth_cookie(name, &verifier, lifetime));
        self.scrubber.record(ctx, &[name.as_str()]);
        Ok(pkce_challenge(&verifier))
    }

    fn persist_session(&self, ctx: &mut dyn ClientContext, session: &Session) {
        let names = self.scrubber.names();
        let lifetime = time::Duration::days(SESSION_COOKIE_DAYS);

        ctx.set_cookie(
            self.scrubber
                .auth_cookie(&names.access, &session.access_token, lifetime),
        );
        let mut written = vec![names.access.as_str()];
        if let Some(refresh_token) = &session.refresh_token {
            ctx.set_cookie(self.scrubber.auth_cookie(&names.refresh, refresh_token, lifetime));
            written.push(names.refresh.as_str());
        }
        self.scrubber.record(ctx, &written);
    }

    fn publish(&self, kind: AuthEventKind, session: &Session) {
        self.events.publish(AuthEvent::for_session(kind, session));
    }
}

fn timestamp(secs: usize) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap_or_default()
}

fn session_from_claims(
    claims: Claims,
    user: StoreUser,
    access_token: String,
    refresh_token: Option<String>,
) -> Session {
    Session {
        email_confirmed: user.email_confirmed(),
        provider: user.provider(),
        user_id: user.id,
        email: user.email.or(claims.email),
        issued_at: timestamp(claims.iat),
        expires_at: timestamp(claims.exp),
        access_token,
        refresh_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BrowserContext;
    use crate::store::MemoryStore;

    fn setup() -> (AuthSessionManager, MemoryStore, BrowserContext) {
        let config = Config::test_default();
        let memory = MemoryStore::new(&config.jwt_secret);
        let store = SessionStore::new_mock(&config, memory.clone());
        let manager = AuthSessionManager::new(&config, store, SessionEvents::new());
        (manager, memory, BrowserContext::new("localhost"))
    }

    #[tokio::test]
    async fn test_no_cookie_is_anonymous() {
        let (manager, _, mut browser) = setup();
        assert_eq!(manager.get_current_session(&mut browser).await, Ok(None));
    }

    #[tokio::test]
    async fn test_sign_in_then_current_session() {
        let (manager, memory, mut browser) = setup();
        let user_id = memory.create_user("ana@example.edu", "secret-pw", true);

        manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();

        let session = manager
            .get_current_session(&mut browser)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.user_id, user_id);
        assert!(session.email_confirmed);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let (manager, memory, mut browser) = setup();
        memory.create_user("ana@example.edu", "secret-pw", true);
        memory.set_token_lifetime(-60);
        let first = manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();

        memory.set_token_lifetime(3600);
        let mut events = manager.events().subscribe();
        let refreshed = manager
            .get_current_session(&mut browser)
            .await
            .unwrap()
            .unwrap();

        assert_ne!(refreshed.access_token, first.access_token);
        assert_eq!(
            browser.cookie_value(&manager.scrubber().names().access),
            Some(refreshed.access_token.clone())
        );
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::TokenRefreshed);
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error_not_anonymous() {
        let (manager, memory, mut browser) = setup();
        memory.create_user("ana@example.edu", "secret-pw", true);
        manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();

        memory.set_offline(true);
        let err = manager.get_current_session(&mut browser).await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_oauth_consumes_account_chooser_flag() {
        let (manager, _, mut browser) = setup();
        browser.set_storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY, "true");

        let redirect = manager
            .sign_in_with_oauth(&mut browser, OAuthProvider::Google)
            .unwrap();
        assert!(redirect.select_account);
        assert!(redirect.url.contains("prompt=select_account"));
        assert!(browser
            .storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY)
            .is_none());

        let again = manager
            .sign_in_with_oauth(&mut browser, OAuthProvider::Google)
            .unwrap();
        assert!(!again.select_account);
    }

    #[tokio::test]
    async fn test_oauth_roundtrip_through_callback() {
        let (manager, memory, mut browser) = setup();
        manager
            .sign_in_with_oauth(&mut browser, OAuthProvider::Google)
            .unwrap();

        let verifier = browser
            .cookie_value(&manager.scrubber().names().verifier)
            .unwrap();
        let code = memory.grant_oauth_code("ana@example.edu", "google", &pkce_challenge(&verifier));

        let session = manager
            .complete_oauth(&mut browser, &code)
            .await
            .unwrap();
        assert_eq!(session.email.as_deref(), Some("ana@example.edu"));
        assert!(!browser.has_cookie(&manager.scrubber().names().verifier));
    }

    #[tokio::test]
    async fn test_sign_out_twice_reports_already_logged_out() {
        let (manager, memory, mut browser) = setup();
        memory.create_user("ana@example.edu", "secret-pw", true);
        let session = manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();

        assert_eq!(
            manager
                .sign_out(&session.access_token, SignOutScope::Global)
                .await,
            Ok(())
        );
        assert_eq!(
            manager
                .sign_out(&session.access_token, SignOutScope::Global)
                .await,
            Err(AuthError::AlreadyLoggedOut)
        );
    }

    #[tokio::test]
    async fn test_revoked_session_cookies_are_dropped() {
        let (manager, memory, mut browser) = setup();
        memory.create_user("ana@example.edu", "secret-pw", true);
        let session = manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();

        // Another device signs out everywhere.
        manager
            .sign_out(&session.access_token, SignOutScope::Global)
            .await
            .unwrap();

        assert_eq!(manager.get_current_session(&mut browser).await, Ok(None));
        let names = manager.scrubber().names();
        assert!(!browser.has_cookie(&names.access));
        assert!(!browser.has_cookie(&names.refresh));
        assert!(!browser.has_cookie(&names.ledger));
    }

    #[tokio::test]
    async fn test_rejected_refresh_drops_cookies() {
        let (manager, memory, mut browser) = setup();
        memory.create_user("ana@example.edu", "secret-pw", true);
        memory.set_token_lifetime(-60);
        let session = manager
            .sign_in_with_password(&mut browser, "ana@example.edu", "secret-pw")
            .await
            .unwrap();
        // Another tab already spent the single-use refresh token.
        let refresh_token = session.refresh_token.unwrap();
        manager.store().refresh_session(&refresh_token).await.unwrap();

        assert_eq!(manager.get_current_session(&mut browser).await, Ok(None));
        assert!(!browser.has_cookie(&manager.scrubber().names().access));
    }
}
