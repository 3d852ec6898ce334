// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase client for the auth (GoTrue) and REST (PostgREST) APIs.
//!
//! Handles:
//! - Password, PKCE and refresh-token grants
//! - Sign-up, recovery, resend and password update
//! - Session revocation (local or global scope)
//! - Profile row reads and updates under the user's own JWT (RLS applies)

use super::{SignUpOutcome, StoreUser, TokenResponse};
use crate::config::Config;
use crate::error::{AuthError, ProfileError};
use crate::models::{ProfileRow, ProfileUpdate, Session, SignOutScope};
use serde::Deserialize;

/// Supabase API client.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    profile_table: String,
}

/// Error body shapes returned by GoTrue (older and newer versions).
#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl GoTrueError {
    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            profile_table: config.profile_table.clone(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    fn anon(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    fn as_user(&self, builder: reqwest::RequestBuilder, access_token: &str) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    // ─── Auth API ────────────────────────────────────────────────

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/token?grant_type=password")))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let tokens: TokenResponse = self.check_auth_json(response).await?;
        Ok(tokens.into_session())
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/signup")))
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "code_challenge": code_challenge,
                "code_challenge_method": "s256",
            }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let body: serde_json::Value = self.check_auth_json(response).await?;

        // With auto-confirm the body is a session; otherwise it is the user.
        if body.get("access_token").is_some() {
            let tokens: TokenResponse = serde_json::from_value(body)
                .map_err(|e| AuthError::Rejected(format!("JSON parse error: {}", e)))?;
            let session = tokens.into_session();
            return Ok(SignUpOutcome {
                user_id: session.user_id.clone(),
                session: Some(session),
            });
        }

        let user: StoreUser = serde_json::from_value(body)
            .map_err(|e| AuthError::Rejected(format!("JSON parse error: {}", e)))?;
        Ok(SignUpOutcome {
            user_id: user.id,
            session: None,
        })
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session, AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/token?grant_type=pkce")))
            .json(&serde_json::json!({ "auth_code": code, "code_verifier": verifier }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let tokens: TokenResponse = self.check_auth_json(response).await?;
        Ok(tokens.into_session())
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/token?grant_type=refresh_token")))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token refresh request failed: {}", e)))?;

        let tokens: TokenResponse = self.check_auth_json(response).await?;
        Ok(tokens.into_session())
    }

    pub async fn get_user(&self, access_token: &str) -> Result<StoreUser, AuthError> {
        let response = self
            .as_user(self.http.get(self.auth_url("/user")), access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_auth_json(response).await
    }

    /// Revoke the session behind `access_token`.
    ///
    /// GoTrue answers 401/403/404 for sessions that are already gone.
    pub async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), AuthError> {
        let response = self
            .as_user(self.http.post(self.auth_url("/logout")), access_token)
            .query(&[("scope", scope.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Sign-out request failed: {}", e)))?;

        match response.status().as_u16() {
            401 | 403 | 404 => Err(AuthError::AlreadyLoggedOut),
            _ => self.check_auth(response).await,
        }
    }

    pub async fn recover(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/recover")))
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({
                "email": email,
                "code_challenge": code_challenge,
                "code_challenge_method": "s256",
            }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_auth(response).await
    }

    pub async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<StoreUser, AuthError> {
        let response = self
            .as_user(self.http.put(self.auth_url("/user")), access_token)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_auth_json(response).await
    }

    pub async fn resend_signup(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let response = self
            .anon(self.http.post(self.auth_url("/resend")))
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "type": "signup", "email": email }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_auth(response).await
    }

    /// Map a non-success GoTrue response to an [`AuthError`].
    async fn auth_error(&self, response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: GoTrueError = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed.message();

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Session store server error");
            return AuthError::Network(format!("HTTP {}: {}", status, message));
        }

        if status.as_u16() == 429 {
            tracing::warn!("Session store rate limit hit (429)");
            return AuthError::Rejected("rate limited".to_string());
        }

        let code = parsed.error_code.as_deref().unwrap_or_default();
        if code == "invalid_credentials" || message == "Invalid login credentials" {
            return AuthError::InvalidCredentials;
        }
        if code == "email_not_confirmed" || message == "Email not confirmed" {
            return AuthError::EmailNotConfirmed;
        }

        AuthError::Rejected(format!("HTTP {}: {}", status, message))
    }

    async fn check_auth(&self, response: reqwest::Response) -> Result<(), AuthError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.auth_error(response).await)
    }

    async fn check_auth_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AuthError> {
        if !response.status().is_success() {
            return Err(self.auth_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Rejected(format!("JSON parse error: {}", e)))
    }

    // ─── Profile Table ───────────────────────────────────────────

    fn profile_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.profile_table)
    }

    pub async fn fetch_profile(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<Option<ProfileRow>, ProfileError> {
        let response = self
            .as_user(self.http.get(self.profile_url()), access_token)
            .query(&[("id", format!("eq.{}", user_id)), ("select", "*".to_string())])
            .send()
            .await
            .map_err(|e| ProfileError::Network(e.to_string()))?;

        let rows: Vec<ProfileRow> = self.check_rest_json(response).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_profile(
        &self,
        access_token: &str,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRow, ProfileError> {
        let response = self
            .as_user(self.http.patch(self.profile_url()), access_token)
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await
            .map_err(|e| ProfileError::Network(e.to_string()))?;

        let rows: Vec<ProfileRow> = self.check_rest_json(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ProfileError::ProfileNotFound(user_id.to_string()))
    }

    async fn check_rest_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProfileError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Expired JWTs and outages both land here; callers fail closed.
            return Err(ProfileError::Network(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProfileError::Malformed(format!("JSON parse error: {}", e)))
    }
}
