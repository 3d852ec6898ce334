// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session model and its public projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// How the identity behind a session signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum AuthProvider {
    Password,
    OAuth(String),
}

impl AuthProvider {
    /// Map the store's `app_metadata.provider` value.
    pub fn from_store(provider: Option<&str>) -> Self {
        match provider {
            None | Some("email") => AuthProvider::Password,
            Some(other) => AuthProvider::OAuth(other.to_string()),
        }
    }
}

/// OAuth providers the portal offers on the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Azure,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Azure => "azure",
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(OAuthProvider::Google),
            "azure" => Ok(OAuthProvider::Azure),
            other => Err(format!("unsupported OAuth provider: {other}")),
        }
    }
}

/// Scope of a remote sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// Revoke only this session.
    Local,
    /// Revoke every session of the identity, on every device.
    Global,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        }
    }
}

/// Credential bound to one authenticated identity.
///
/// Owned by the Session Store; this is the client's cached copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Subject identifier (auth user id)
    pub user_id: String,
    pub email: Option<String>,
    pub provider: AuthProvider,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub email_confirmed: bool,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Signed in, but the email address still awaits confirmation.
    pub fn pending_verification(&self) -> bool {
        !self.email_confirmed
    }

    /// Token-free view safe to hand to the browser.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            provider: match &self.provider {
                AuthProvider::Password => "email".to_string(),
                AuthProvider::OAuth(name) => name.clone(),
            },
            expires_at: self.expires_at.to_rfc3339(),
            email_confirmed: self.email_confirmed,
        }
    }
}

/// Public session projection sent to pages and event subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionInfo {
    pub user_id: String,
    pub email: Option<String>,
    pub provider: String,
    pub expires_at: String,
    pub email_confirmed: bool,
}
