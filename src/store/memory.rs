// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory Session Store.
//!
//! Behaves like a Supabase project with a post-signup trigger that inserts an
//! empty profile row. Access tokens are real HS256 JWTs signed with the
//! configured secret, so token verification runs the same code path as
//! production. Test hooks can take the store offline, slow it down, or
//! shorten token lifetimes.

use super::{SignUpOutcome, StoreUser, AppMetadata};
use crate::error::{AuthError, ProfileError};
use crate::models::{ProfileRow, ProfileUpdate, RoleFlags, Session, AuthProvider, SignOutScope};
use crate::services::tokens::{
    create_access_token, inspect_access_token, pkce_challenge, Claims, TokenState, AUDIENCE,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Kind of email the store would have delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Confirmation,
    Recovery,
}

/// Email captured instead of being delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub kind: EmailKind,
    pub email: String,
    pub redirect_to: String,
    /// Authorization code embedded in the link.
    pub code: String,
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    email: String,
    password: Option<String>,
    email_confirmed: bool,
    provider: String,
}

#[derive(Debug, Clone)]
struct PendingCode {
    user_id: String,
    /// `None` for links that were not started with PKCE.
    challenge: Option<String>,
    confirms_email: bool,
}

#[derive(Default)]
struct Inner {
    jwt_secret: Vec<u8>,
    /// Keyed by lowercase email.
    accounts: DashMap<String, Account>,
    profiles: DashMap<String, ProfileRow>,
    /// session_id -> user_id
    sessions: DashMap<String, String>,
    /// refresh token -> session_id
    refresh_tokens: DashMap<String, String>,
    codes: DashMap<String, PendingCode>,
    outbox: Mutex<Vec<SentEmail>>,
    offline: AtomicBool,
    allow_unverified: AtomicBool,
    latency_ms: AtomicU64,
    token_lifetime_secs: AtomicI64,
    next_id: AtomicU64,
}

/// Offline Session Store shared by clones.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(jwt_secret: &[u8]) -> Self {
        let inner = Inner {
            jwt_secret: jwt_secret.to_vec(),
            token_lifetime_secs: AtomicI64::new(DEFAULT_TOKEN_LIFETIME_SECS),
            ..Default::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // ─── Test Hooks ──────────────────────────────────────────────

    /// Every call fails with a transport error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Lifetime of newly issued access tokens. Negative values issue
    /// tokens that are already expired.
    pub fn set_token_lifetime(&self, seconds: i64) {
        self.inner.token_lifetime_secs.store(seconds, Ordering::SeqCst);
    }

    /// Let unconfirmed accounts sign in (GoTrue `allow_unverified_email_sign_ins`).
    pub fn set_allow_unverified(&self, allow: bool) {
        self.inner.allow_unverified.store(allow, Ordering::SeqCst);
    }

    /// Create an account and its (role-less) profile row.
    pub fn create_user(&self, email: &str, password: &str, email_confirmed: bool) -> String {
        self.insert_account(email, Some(password), email_confirmed, "email")
    }

    pub fn set_roles(&self, user_id: &str, flags: RoleFlags) {
        if let Some(mut row) = self.inner.profiles.get_mut(user_id) {
            row.is_student = Some(flags.is_student);
            row.is_advisor = Some(flags.is_advisor);
            row.is_reviewer = Some(flags.is_reviewer);
            row.is_coordinator = Some(flags.is_coordinator);
            row.is_administrator = Some(flags.is_administrator);
        }
    }

    /// Simulate a signup trigger that never ran.
    pub fn remove_profile(&self, user_id: &str) {
        self.inner.profiles.remove(user_id);
    }

    pub fn profile(&self, user_id: &str) -> Option<ProfileRow> {
        self.inner.profiles.get(user_id).map(|row| row.clone())
    }

    pub fn confirm_email(&self, email: &str) {
        if let Some(mut account) = self.inner.accounts.get_mut(&email.to_lowercase()) {
            account.email_confirmed = true;
        }
    }

    pub fn active_sessions(&self, user_id: &str) -> usize {
        self.inner
            .sessions
            .iter()
            .filter(|entry| entry.value() == user_id)
            .count()
    }

    /// Complete a provider consent screen: returns the code the provider
    /// would append to the callback URL.
    pub fn grant_oauth_code(&self, email: &str, provider: &str, challenge: &str) -> String {
        let user_id = match self.inner.accounts.get(&email.to_lowercase()) {
            Some(account) => account.user_id.clone(),
            None => self.insert_account(email, None, true, provider),
        };
        self.issue_code(user_id, Some(challenge.to_string()), false)
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.inner
            .outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    // ─── Internals ───────────────────────────────────────────────

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn insert_account(
        &self,
        email: &str,
        password: Option<&str>,
        email_confirmed: bool,
        provider: &str,
    ) -> String {
        let user_id = format!("00000000-0000-4000-8000-{:012x}", self.next_id());
        self.inner.accounts.insert(
            email.to_lowercase(),
            Account {
                user_id: user_id.clone(),
                email: email.to_string(),
                password: password.map(str::to_string),
                email_confirmed,
                provider: provider.to_string(),
            },
        );
        self.inner.profiles.insert(
            user_id.clone(),
            ProfileRow {
                id: Some(user_id.clone()),
                email: Some(email.to_string()),
                ..Default::default()
            },
        );
        user_id
    }

    fn issue_code(&self, user_id: String, challenge: Option<String>, confirms_email: bool) -> String {
        let code = format!("code-{:08x}", self.next_id());
        self.inner.codes.insert(
            code.clone(),
            PendingCode {
                user_id,
                challenge,
                confirms_email,
            },
        );
        code
    }

    fn send_email(&self, email: SentEmail) {
        if let Ok(mut outbox) = self.inner.outbox.lock() {
            outbox.push(email);
        }
    }

    /// Simulated network: latency first, then reachability.
    async fn round_trip(&self) -> Result<(), String> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        Ok(())
    }

    fn account_by_id(&self, user_id: &str) -> Option<Account> {
        self.inner
            .accounts
            .iter()
            .find(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
    }

    fn store_user(account: &Account) -> StoreUser {
        StoreUser {
            id: account.user_id.clone(),
            email: Some(account.email.clone()),
            email_confirmed_at: account
                .email_confirmed
                .then(|| "2026-01-01T00:00:00Z".to_string()),
            app_metadata: AppMetadata {
                provider: Some(account.provider.clone()),
            },
        }
    }

    fn start_session(&self, account: &Account) -> Result<Session, AuthError> {
        let session_id = format!("session-{:08x}", self.next_id());
        self.inner
            .sessions
            .insert(session_id.clone(), account.user_id.clone());
        self.mint_tokens(account, session_id)
    }

    fn mint_tokens(&self, account: &Account, session_id: String) -> Result<Session, AuthError> {
        let now = Utc::now();
        let lifetime = self.inner.token_lifetime_secs.load(Ordering::SeqCst);
        let expires_at = now + chrono::Duration::seconds(lifetime);

        let claims = Claims {
            sub: account.user_id.clone(),
            exp: expires_at.timestamp().max(0) as usize,
            iat: now.timestamp() as usize,
            aud: AUDIENCE.to_string(),
            email: Some(account.email.clone()),
            session_id: Some(session_id.clone()),
            role: Some("authenticated".to_string()),
        };
        let access_token = create_access_token(&claims, &self.inner.jwt_secret)
            .map_err(|e| AuthError::Rejected(format!("token signing failed: {}", e)))?;

        let refresh_token = format!("rt-{:08x}", self.next_id());
        self.inner
            .refresh_tokens
            .insert(refresh_token.clone(), session_id);

        Ok(Session {
            user_id: account.user_id.clone(),
            email: Some(account.email.clone()),
            provider: AuthProvider::from_store(Some(&account.provider)),
            issued_at: DateTime::<Utc>::from_timestamp(claims.iat as i64, 0).unwrap_or(now),
            expires_at,
            email_confirmed: account.email_confirmed,
            access_token,
            refresh_token: Some(refresh_token),
        })
    }

    /// Claims of a token whose session is still active.
    fn live_claims(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = match inspect_access_token(access_token, &self.inner.jwt_secret) {
            TokenState::Valid(claims) => claims,
            TokenState::Expired(_) => {
                return Err(AuthError::Rejected("invalid JWT: token is expired".to_string()))
            }
            TokenState::Invalid => return Err(AuthError::Rejected("invalid JWT".to_string())),
        };
        let active = claims
            .session_id
            .as_ref()
            .map(|sid| self.inner.sessions.contains_key(sid))
            .unwrap_or(false);
        if !active {
            return Err(AuthError::Rejected("session not found".to_string()));
        }
        Ok(claims)
    }

    fn end_sessions(&self, session_ids: &[String]) {
        for sid in session_ids {
            self.inner.sessions.remove(sid);
        }
        self.inner
            .refresh_tokens
            .retain(|_, sid| !session_ids.contains(sid));
    }

    // ─── Store API ───────────────────────────────────────────────

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let account = self
            .inner
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.clone())
            .filter(|a| a.password.as_deref() == Some(password))
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.email_confirmed && !self.inner.allow_unverified.load(Ordering::SeqCst) {
            return Err(AuthError::EmailNotConfirmed);
        }
        self.start_session(&account)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        if self.inner.accounts.contains_key(&email.to_lowercase()) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }
        let user_id = self.insert_account(email, Some(password), false, "email");
        let code = self.issue_code(user_id.clone(), Some(code_challenge.to_string()), true);
        self.send_email(SentEmail {
            kind: EmailKind::Confirmation,
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
            code,
        });

        let session = if self.inner.allow_unverified.load(Ordering::SeqCst) {
            let account = self
                .account_by_id(&user_id)
                .ok_or_else(|| AuthError::Rejected("account vanished".to_string()))?;
            Some(self.start_session(&account)?)
        } else {
            None
        };

        Ok(SignUpOutcome { user_id, session })
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let (_, pending) = self
            .inner
            .codes
            .remove(code)
            .ok_or_else(|| AuthError::Rejected("invalid flow state, no valid flow state found".to_string()))?;

        if let Some(challenge) = &pending.challenge {
            if *challenge != pkce_challenge(verifier) {
                return Err(AuthError::Rejected("code challenge does not match".to_string()));
            }
        }

        let mut account = self
            .account_by_id(&pending.user_id)
            .ok_or_else(|| AuthError::Rejected("User not found".to_string()))?;
        if pending.confirms_email {
            self.confirm_email(&account.email);
            account.email_confirmed = true;
        }
        self.start_session(&account)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        // Refresh tokens are single use.
        let (_, session_id) = self
            .inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| AuthError::Rejected("Invalid Refresh Token".to_string()))?;
        let user_id = self
            .inner
            .sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthError::Rejected("Invalid Refresh Token".to_string()))?;
        let account = self
            .account_by_id(&user_id)
            .ok_or_else(|| AuthError::Rejected("User not found".to_string()))?;

        self.mint_tokens(&account, session_id)
    }

    pub async fn get_user(&self, access_token: &str) -> Result<StoreUser, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let claims = self.live_claims(access_token)?;
        let account = self
            .account_by_id(&claims.sub)
            .ok_or_else(|| AuthError::Rejected("User not found".to_string()))?;
        Ok(Self::store_user(&account))
    }

    pub async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let claims = self
            .live_claims(access_token)
            .map_err(|_| AuthError::AlreadyLoggedOut)?;

        let ended: Vec<String> = match scope {
            SignOutScope::Local => claims.session_id.into_iter().collect(),
            SignOutScope::Global => self
                .inner
                .sessions
                .iter()
                .filter(|entry| *entry.value() == claims.sub)
                .map(|entry| entry.key().clone())
                .collect(),
        };
        self.end_sessions(&ended);
        Ok(())
    }

    pub async fn recover(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        // Unknown addresses succeed silently, like GoTrue.
        let Some(user_id) = self
            .inner
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.user_id.clone())
        else {
            return Ok(());
        };
        let code = self.issue_code(user_id, Some(code_challenge.to_string()), true);
        self.send_email(SentEmail {
            kind: EmailKind::Recovery,
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
            code,
        });
        Ok(())
    }

    pub async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<StoreUser, AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let claims = self.live_claims(access_token)?;
        let mut account = self
            .inner
            .accounts
            .iter_mut()
            .find(|entry| entry.value().user_id == claims.sub)
            .ok_or_else(|| AuthError::Rejected("User not found".to_string()))?;
        account.password = Some(password.to_string());
        Ok(Self::store_user(account.value()))
    }

    pub async fn resend_signup(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.round_trip().await.map_err(AuthError::Network)?;

        let Some(account) = self
            .inner
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.clone())
        else {
            return Ok(());
        };
        if account.email_confirmed {
            return Ok(());
        }
        let code = self.issue_code(account.user_id, None, true);
        self.send_email(SentEmail {
            kind: EmailKind::Confirmation,
            email: account.email,
            redirect_to: redirect_to.to_string(),
            code,
        });
        Ok(())
    }

    pub async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<ProfileRow>, ProfileError> {
        self.round_trip().await.map_err(ProfileError::Network)?;

        // Row-level security: a user only sees their own row.
        match inspect_access_token(access_token, &self.inner.jwt_secret) {
            TokenState::Valid(claims) if claims.sub == user_id => Ok(self.profile(user_id)),
            TokenState::Valid(_) => Ok(None),
            _ => Err(ProfileError::Network("HTTP 401 Unauthorized: JWT expired".to_string())),
        }
    }

    pub async fn update_profile(
        &self,
        access_token: &str,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRow, ProfileError> {
        self.round_trip().await.map_err(ProfileError::Network)?;

        match inspect_access_token(access_token, &self.inner.jwt_secret) {
            TokenState::Valid(claims) if claims.sub == user_id => {}
            TokenState::Valid(_) => return Err(ProfileError::ProfileNotFound(user_id.to_string())),
            _ => return Err(ProfileError::Network("HTTP 401 Unauthorized: JWT expired".to_string())),
        }

        let mut row = self
            .inner
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| ProfileError::ProfileNotFound(user_id.to_string()))?;
        update.apply_to(&mut row);
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_jwt_secret_32_bytes_minimum!";

    #[tokio::test]
    async fn test_global_sign_out_revokes_every_device() {
        let store = MemoryStore::new(SECRET);
        let user_id = store.create_user("ana@example.edu", "pw", true);

        let laptop = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        let phone = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        assert_eq!(store.active_sessions(&user_id), 2);

        store
            .sign_out(&laptop.access_token, SignOutScope::Global)
            .await
            .unwrap();

        assert_eq!(store.active_sessions(&user_id), 0);
        assert!(store.get_user(&phone.access_token).await.is_err());
        assert_eq!(
            store.sign_out(&phone.access_token, SignOutScope::Global).await,
            Err(AuthError::AlreadyLoggedOut)
        );
    }

    #[tokio::test]
    async fn test_local_sign_out_keeps_other_sessions() {
        let store = MemoryStore::new(SECRET);
        let user_id = store.create_user("ana@example.edu", "pw", true);

        let laptop = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        let phone = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        store
            .sign_out(&laptop.access_token, SignOutScope::Local)
            .await
            .unwrap();

        assert_eq!(store.active_sessions(&user_id), 1);
        assert!(store.get_user(&phone.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_tokens_are_single_use() {
        let store = MemoryStore::new(SECRET);
        store.create_user("ana@example.edu", "pw", true);
        let session = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        let rt = session.refresh_token.unwrap();

        let refreshed = store.refresh_session(&rt).await.unwrap();
        assert_ne!(refreshed.refresh_token.as_deref(), Some(rt.as_str()));
        assert!(store.refresh_session(&rt).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_pkce_verifier_is_rejected() {
        let store = MemoryStore::new(SECRET);
        let code = store.grant_oauth_code("ana@example.edu", "google", &pkce_challenge("right"));

        let err = store.exchange_code(&code, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unconfirmed_sign_in() {
        let store = MemoryStore::new(SECRET);
        store.create_user("ana@example.edu", "pw", false);

        assert_eq!(
            store.sign_in_with_password("ana@example.edu", "pw").await,
            Err(AuthError::EmailNotConfirmed)
        );

        store.set_allow_unverified(true);
        let session = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();
        assert!(session.pending_verification());
    }

    #[tokio::test]
    async fn test_profile_rls_hides_other_rows() {
        let store = MemoryStore::new(SECRET);
        let ana = store.create_user("ana@example.edu", "pw", true);
        let luis = store.create_user("luis@example.edu", "pw", true);
        let session = store.sign_in_with_password("ana@example.edu", "pw").await.unwrap();

        assert!(store
            .fetch_profile(&session.access_token, &ana)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .fetch_profile(&session.access_token, &luis)
            .await
            .unwrap()
            .is_none());
    }
}
