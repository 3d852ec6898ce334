// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth artifacts in the browser and their removal.
//!
//! Two sources decide what gets deleted:
//! - the artifact ledger, an HMAC-signed cookie listing the exact cookie
//!   names this service set for the current session
//! - the namespace rule (`sb-` prefix, or `supabase` / `auth-token` in the
//!   name) for remnants left by other clients or older sessions
//!
//! Cookies are removed in every variant a browser may hold them under:
//! host-only, `Domain=<host>` and `Domain=.<host>`, all at the root path.

use crate::client::{ClientContext, CookieRemoval, StorageArea};
use crate::config::{is_local_host, Config};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Durable flag that makes the next OAuth sign-in show the account chooser.
/// Never scrubbed.
pub const FORCE_ACCOUNT_CHOOSER_KEY: &str = "sipet-force-account-chooser";

const AUTH_PREFIX: &str = "sb-";
const AUTH_MARKERS: [&str; 2] = ["supabase", "auth-token"];

/// Whether a cookie or storage key belongs to the auth layer.
pub fn is_auth_artifact(name: &str) -> bool {
    if name == FORCE_ACCOUNT_CHOOSER_KEY {
        return false;
    }
    name.starts_with(AUTH_PREFIX) || AUTH_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Cookie names owned by this service for one Supabase project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCookieNames {
    pub access: String,
    pub refresh: String,
    pub verifier: String,
    pub ledger: String,
}

impl AuthCookieNames {
    pub fn for_project(project_ref: &str) -> Self {
        Self {
            access: format!("sb-{project_ref}-auth-token"),
            refresh: format!("sb-{project_ref}-refresh-token"),
            verifier: format!("sb-{project_ref}-code-verifier"),
            ledger: format!("sb-{project_ref}-auth-ledger"),
        }
    }
}

/// Exact cookie names recorded at session creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLedger {
    pub cookies: BTreeSet<String>,
}

/// What a scrub removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubReport {
    pub cookies: Vec<String>,
    pub storage: Vec<(StorageArea, String)>,
}

/// Builds and removes auth cookies; keeps the ledger.
#[derive(Clone)]
pub struct ArtifactScrubber {
    names: AuthCookieNames,
    domain_variants: Vec<Option<String>>,
    secure: bool,
    ledger_key: Vec<u8>,
}

impl ArtifactScrubber {
    pub fn new(config: &Config) -> Self {
        let mut domain_variants = vec![None];
        // Browsers ignore Domain=localhost / IP literals.
        if let Some(host) = config.public_host().filter(|h| !is_local_host(h)) {
            domain_variants.push(Some(host.clone()));
            domain_variants.push(Some(format!(".{host}")));
        }

        Self {
            names: AuthCookieNames::for_project(&config.project_ref()),
            domain_variants,
            secure: config.is_secure(),
            ledger_key: config.ledger_key.clone(),
        }
    }

    pub fn names(&self) -> &AuthCookieNames {
        &self.names
    }

    /// Removals for every variant of `name`.
    pub fn cookie_variants(&self, name: &str) -> Vec<CookieRemoval> {
        self.domain_variants
            .iter()
            .map(|domain| CookieRemoval {
                name: name.to_string(),
                domain: domain.clone(),
                path: "/".to_string(),
                secure: self.secure,
            })
            .collect()
    }

    /// Host-only, HttpOnly cookie for an auth artifact.
    pub fn auth_cookie(&self, name: &str, value: &str, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(max_age)
            .build()
    }

    /// Remove every variant of one cookie.
    pub fn remove_cookie(&self, ctx: &mut dyn ClientContext, name: &str) {
        for removal in self.cookie_variants(name) {
            ctx.remove_cookie(&removal);
        }
    }

    // ─── Ledger ──────────────────────────────────────────────────

    fn sign(&self, payload: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.ledger_key).ok()?;
        mac.update(payload.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn encode_ledger(&self, ledger: &ArtifactLedger) -> Option<String> {
        let json = serde_json::to_vec(ledger).ok()?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&payload)?;
        Some(format!("{payload}.{signature}"))
    }

    fn decode_ledger(&self, value: &str) -> Option<ArtifactLedger> {
        let (payload, signature) = value.split_once('.')?;
        let expected = self.sign(payload)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            tracing::warn!("Artifact ledger signature mismatch, ignoring ledger");
            return None;
        }
        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// Ledger stored in the context; empty when missing or tampered with.
    pub fn read_ledger(&self, ctx: &dyn ClientContext) -> ArtifactLedger {
        ctx.cookie_value(&self.names.ledger)
            .and_then(|value| self.decode_ledger(&value))
            .unwrap_or_default()
    }

    /// Add names to the ledger cookie.
    pub fn record(&self, ctx: &mut dyn ClientContext, names: &[&str]) {
        let mut ledger = self.read_ledger(ctx);
        ledger.cookies.extend(names.iter().map(|n| n.to_string()));

        match self.encode_ledger(&ledger) {
            Some(value) => ctx.set_cookie(self.auth_cookie(
                &self.names.ledger,
                &value,
                time::Duration::days(30),
            )),
            None => tracing::error!("Failed to encode artifact ledger"),
        }
    }

    // ─── Scrubbing ───────────────────────────────────────────────

    /// Delete every auth cookie: ledger entries plus namespace matches.
    pub fn scrub_cookies(&self, ctx: &mut dyn ClientContext) -> Vec<String> {
        let mut targets: BTreeSet<String> = self.read_ledger(ctx).cookies;
        targets.extend(
            ctx.cookie_names()
                .into_iter()
                .filter(|name| is_auth_artifact(name)),
        );

        for name in &targets {
            self.remove_cookie(ctx, name);
        }
        targets.into_iter().collect()
    }

    /// Delete auth keys from both storage areas, sparing the chooser flag.
    pub fn scrub_storage(&self, ctx: &mut dyn ClientContext) -> Vec<(StorageArea, String)> {
        let mut removed = Vec::new();
        for area in [StorageArea::Local, StorageArea::Session] {
            for key in ctx.storage_keys(area) {
                if is_auth_artifact(&key) {
                    ctx.remove_storage_item(area, &key);
                    removed.push((area, key));
                }
            }
        }
        removed
    }

    pub fn scrub(&self, ctx: &mut dyn ClientContext) -> ScrubReport {
        ScrubReport {
            cookies: self.scrub_cookies(ctx),
            storage: self.scrub_storage(ctx),
        }
    }
}
