// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token claims and PKCE helpers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Audience Supabase stamps on user access tokens.
pub const AUDIENCE: &str = "authenticated";

/// Access token claims (subset of the Supabase JWT).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (auth user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Result of inspecting an access token locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid(Claims),
    /// Signature checks out but `exp` has passed.
    Expired(Claims),
    Invalid,
}

fn validation(validate_exp: bool) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    validation.leeway = 0;
    validation.validate_exp = validate_exp;
    validation
}

/// Verify an access token against the project's JWT secret.
pub fn inspect_access_token(token: &str, secret: &[u8]) -> TokenState {
    let key = DecodingKey::from_secret(secret);

    match decode::<Claims>(token, &key, &validation(true)) {
        Ok(data) => TokenState::Valid(data.claims),
        Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
            match decode::<Claims>(token, &key, &validation(false)) {
                Ok(data) => TokenState::Expired(data.claims),
                Err(_) => TokenState::Invalid,
            }
        }
        Err(_) => TokenState::Invalid,
    }
}

/// Sign an access token. Used by the in-memory store.
pub fn create_access_token(claims: &Claims, secret: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    Ok(encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Fresh PKCE code verifier (43 URL-safe characters).
pub fn generate_code_verifier() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("system RNG unavailable"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// S256 code challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
