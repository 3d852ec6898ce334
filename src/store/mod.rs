// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session Store: the hosted auth + database backend.
//!
//! Every call is a network round-trip bounded by the configured timeout;
//! an elapsed timeout is reported as a transport failure.

pub mod memory;
pub mod supabase;

pub use memory::{EmailKind, MemoryStore, SentEmail};
pub use supabase::SupabaseClient;

use crate::config::Config;
use crate::error::{AuthError, ProfileError};
use crate::models::{AuthProvider, OAuthProvider, ProfileRow, ProfileUpdate, Session, SignOutScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// `app_metadata` of an auth user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

/// Auth user as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

impl StoreUser {
    pub fn email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    pub fn provider(&self) -> AuthProvider {
        AuthProvider::from_store(self.app_metadata.provider.as_deref())
    }
}

/// Token grant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: StoreUser,
}

impl TokenResponse {
    pub fn into_session(self) -> Session {
        let now = Utc::now();
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + chrono::Duration::seconds(self.expires_in));

        Session {
            email_confirmed: self.user.email_confirmed(),
            provider: self.user.provider(),
            user_id: self.user.id,
            email: self.user.email,
            issued_at: now,
            expires_at,
            access_token: self.access_token,
            refresh_token: Some(self.refresh_token),
        }
    }
}

/// Result of a sign-up request.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user_id: String,
    /// Present when the project signs users in before confirmation.
    pub session: Option<Session>,
}

#[derive(Clone)]
enum Backend {
    Supabase(SupabaseClient),
    Memory(MemoryStore),
}

/// Session Store client.
#[derive(Clone)]
pub struct SessionStore {
    backend: Backend,
    timeout: Duration,
    supabase_url: String,
}

impl SessionStore {
    /// Store backed by the Supabase project in `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            backend: Backend::Supabase(SupabaseClient::new(config)),
            timeout: config.auth_timeout,
            supabase_url: config.supabase_url.clone(),
        }
    }

    /// Offline store backed by memory, for tests and local demos.
    pub fn new_mock(config: &Config, memory: MemoryStore) -> Self {
        Self {
            backend: Backend::Memory(memory),
            timeout: config.auth_timeout,
            supabase_url: config.supabase_url.clone(),
        }
    }

    async fn bounded<T, E>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, E>>,
        on_timeout: impl FnOnce(String) -> E,
    ) -> Result<T, E> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Session store request timed out");
                Err(on_timeout(format!("{op} timed out")))
            }
        }
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.bounded(
            "sign_in_with_password",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.sign_in_with_password(email, password).await,
                    Backend::Memory(m) => m.sign_in_with_password(email, password).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        self.bounded(
            "sign_up",
            async {
                match &self.backend {
                    Backend::Supabase(c) => {
                        c.sign_up(email, password, redirect_to, code_challenge).await
                    }
                    Backend::Memory(m) => {
                        m.sign_up(email, password, redirect_to, code_challenge).await
                    }
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session, AuthError> {
        self.bounded(
            "exchange_code",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.exchange_code(code, verifier).await,
                    Backend::Memory(m) => m.exchange_code(code, verifier).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.bounded(
            "refresh_session",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.refresh_session(refresh_token).await,
                    Backend::Memory(m) => m.refresh_session(refresh_token).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn get_user(&self, access_token: &str) -> Result<StoreUser, AuthError> {
        self.bounded(
            "get_user",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.get_user(access_token).await,
                    Backend::Memory(m) => m.get_user(access_token).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), AuthError> {
        self.bounded(
            "sign_out",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.sign_out(access_token, scope).await,
                    Backend::Memory(m) => m.sign_out(access_token, scope).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn recover(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), AuthError> {
        self.bounded(
            "recover",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.recover(email, redirect_to, code_challenge).await,
                    Backend::Memory(m) => m.recover(email, redirect_to, code_challenge).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<StoreUser, AuthError> {
        self.bounded(
            "update_password",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.update_password(access_token, password).await,
                    Backend::Memory(m) => m.update_password(access_token, password).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    pub async fn resend_signup(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        self.bounded(
            "resend_signup",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.resend_signup(email, redirect_to).await,
                    Backend::Memory(m) => m.resend_signup(email, redirect_to).await,
                }
            },
            AuthError::Network,
        )
        .await
    }

    /// Provider consent URL for the PKCE authorization-code flow.
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
        select_account: bool,
    ) -> String {
        let mut url = format!(
            "{}/auth/v1/authorize?\
             provider={}&\
             redirect_to={}&\
             code_challenge={}&\
             code_challenge_method=s256",
            self.supabase_url,
            provider.as_str(),
            urlencoding::encode(redirect_to),
            code_challenge
        );
        if select_account {
            url.push_str("&prompt=select_account");
        }
        url
    }

    pub async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<ProfileRow>, ProfileError> {
        self.bounded(
            "fetch_profile",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.fetch_profile(access_token, user_id).await,
                    Backend::Memory(m) => m.fetch_profile(access_token, user_id).await,
                }
            },
            ProfileError::Network,
        )
        .await
    }

    pub async fn update_profile(
        &self,
        access_token: &str,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRow, ProfileError> {
        self.bounded(
            "update_profile",
            async {
                match &self.backend {
                    Backend::Supabase(c) => c.update_profile(access_token, user_id, update).await,
                    Backend::Memory(m) => m.update_profile(access_token, user_id, update).await,
                }
            },
            ProfileError::Network,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_prompt() {
        let config = Config::test_default();
        let store = SessionStore::new_mock(&config, MemoryStore::new(&config.jwt_secret));

        let url = store.authorize_url(
            OAuthProvider::Google,
            "http://localhost:3000/auth/callback",
            "challenge",
            false,
        );
        assert!(url.starts_with("http://localhost:54321/auth/v1/authorize?provider=google&"));
        assert!(url.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
        assert!(url.contains("code_challenge=challenge&code_challenge_method=s256"));
        assert!(!url.contains("prompt="));

        let forced = store.authorize_url(OAuthProvider::Azure, "x", "c", true);
        assert!(forced.ends_with("&prompt=select_account"));
    }

    #[test]
    fn test_token_response_into_session() {
        let response = TokenResponse {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_in: 3600,
            expires_at: None,
            user: StoreUser {
                id: "u1".to_string(),
                email: Some("ana@example.edu".to_string()),
                email_confirmed_at: None,
                app_metadata: AppMetadata {
                    provider: Some("google".to_string()),
                },
            },
        };

        let session = response.into_session();
        assert_eq!(session.user_id, "u1");
        assert!(session.pending_verification());
        assert_eq!(session.provider, AuthProvider::OAuth("google".to_string()));
        assert!(!session.is_expired(Utc::now()));
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_slow_store_times_out_as_network_error() {
        let mut config = Config::test_default();
        config.auth_timeout = Duration::from_millis(20);
        let memory = MemoryStore::new(&config.jwt_secret);
        memory.set_latency(Duration::from_millis(200));
        let store = SessionStore::new_mock(&config, memory);

        let err = store
            .sign_in_with_password("ana@example.edu", "pw")
            .await
            .unwrap_err();
        assert!(err.is_network());
    }
}
