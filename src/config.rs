// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Supabase credentials are read once at startup. The anon key is public by
//! design (it is shipped to browsers by the hosted SDK); the JWT secret is not.

use reqwest::Url;
use std::env;
use std::time::Duration;

/// Default Supabase project table holding user profiles.
pub const DEFAULT_PROFILE_TABLE: &str = "usuarios";

/// Default timeout for a single Session Store round-trip.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Base URL of the Supabase project (e.g. `https://abcd.supabase.co`)
    pub supabase_url: String,
    /// Supabase anon (public) API key
    pub supabase_anon_key: String,
    /// Public URL this portal is served from; cookie domains derive from it
    pub public_url: String,
    /// Server port
    pub port: u16,
    /// Timeout applied to every Session Store request
    pub auth_timeout: Duration,
    /// PostgREST table holding user profiles
    pub profile_table: String,

    // --- Secrets ---
    /// Supabase JWT secret used to verify access tokens (raw bytes)
    pub jwt_secret: Vec<u8>,
    /// HMAC key for the artifact ledger cookie
    pub ledger_key: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            public_url: "http://localhost:3000".to_string(),
            port: 3000,
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
            ledger_key: b"test_ledger_key_32_bytes_minimum!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let supabase_url = env::var("SUPABASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?;
        Url::parse(&supabase_url).map_err(|e| ConfigError::Invalid("SUPABASE_URL", e.to_string()))?;

        let public_url = env::var("PUBLIC_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        Url::parse(&public_url).map_err(|e| ConfigError::Invalid("PUBLIC_URL", e.to_string()))?;

        let jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
            .into_bytes();

        // Falls back to the JWT secret so a single secret is enough locally.
        let ledger_key = env::var("SIPET_LEDGER_KEY")
            .map(|v| v.trim().to_string().into_bytes())
            .unwrap_or_else(|_| jwt_secret.clone());

        let auth_timeout_secs = match env::var("SIPET_AUTH_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid("SIPET_AUTH_TIMEOUT_SECS", e.to_string()))?,
            Err(_) => DEFAULT_AUTH_TIMEOUT_SECS,
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            public_url,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            auth_timeout: Duration::from_secs(auth_timeout_secs),
            profile_table: env::var("SIPET_PROFILE_TABLE")
                .unwrap_or_else(|_| DEFAULT_PROFILE_TABLE.to_string()),
            jwt_secret,
            ledger_key,
        })
    }

    /// Supabase project reference, the first host label of the project URL.
    ///
    /// Local stacks (`localhost`, IP addresses) use `local`.
    pub fn project_ref(&self) -> String {
        let host = Url::parse(&self.supabase_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        if host.is_empty() || is_local_host(&host) {
            return "local".to_string();
        }
        host.split('.').next().unwrap_or("local").to_string()
    }

    /// Host the portal is served from, without port.
    pub fn public_host(&self) -> Option<String> {
        Url::parse(&self.public_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn is_secure(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Origins allowed to make credentialed calls: the portal itself and
    /// local dev servers.
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        if origin.trim_end_matches('/') == self.public_url.trim_end_matches('/') {
            return true;
        }
        Url::parse(origin).is_ok_and(|url| {
            url.scheme() == "http" && matches!(url.host_str(), Some("localhost" | "127.0.0.1"))
        })
    }
}

/// True for hosts where browsers do not accept a `Domain` cookie attribute.
pub fn is_local_host(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost") || host.parse::<std::net::IpAddr>().is_ok()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
