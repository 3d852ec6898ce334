// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory browser profile.
//!
//! Models the parts of a browser the auth layer relies on: a cookie jar
//! keyed by exact (name, domain, path) and the two storage areas. Cookies
//! set with a `Domain` that does not match the host are dropped, as a
//! browser would.

use super::{is_removal, ClientContext, CookieRemoval, StorageArea};
use axum_extra::extract::cookie::Cookie;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CookieScope {
    HostOnly,
    /// Normalized domain, leading dot stripped.
    Domain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CookieKey {
    name: String,
    scope: CookieScope,
    path: String,
}

/// A single-profile browser context held in memory.
#[derive(Debug, Clone, Default)]
pub struct BrowserContext {
    host: String,
    cookies: BTreeMap<CookieKey, String>,
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
}

impl BrowserContext {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Store a cookie the way `document.cookie = ...` from any script would.
    pub fn insert_cookie(&mut self, name: &str, value: &str, domain: Option<&str>, path: &str) {
        let Some(scope) = self.scope_for(domain) else {
            return;
        };
        self.cookies.insert(
            CookieKey {
                name: name.to_string(),
                scope,
                path: path.to_string(),
            },
            value.to_string(),
        );
    }

    /// Number of stored variants of a cookie name.
    pub fn cookie_variants(&self, name: &str) -> usize {
        self.cookies.keys().filter(|key| key.name == name).count()
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookie_variants(name) > 0
    }

    /// Drop session storage, as closing the tab does.
    pub fn close_tab(&mut self) {
        self.session.clear();
    }

    fn scope_for(&self, domain: Option<&str>) -> Option<CookieScope> {
        match domain {
            None => Some(CookieScope::HostOnly),
            Some(raw) => {
                let normalized = raw.trim_start_matches('.').to_ascii_lowercase();
                let matches = self.host == normalized
                    || self.host.ends_with(&format!(".{normalized}"));
                matches.then_some(CookieScope::Domain(normalized))
            }
        }
    }

    fn area(&self, area: StorageArea) -> &BTreeMap<String, String> {
        match area {
            StorageArea::Local => &self.local,
            StorageArea::Session => &self.session,
        }
    }

    fn area_mut(&mut self, area: StorageArea) -> &mut BTreeMap<String, String> {
        match area {
            StorageArea::Local => &mut self.local,
            StorageArea::Session => &mut self.session,
        }
    }
}

impl ClientContext for BrowserContext {
    fn cookie_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cookies.keys().map(|key| key.name.clone()).collect();
        names.dedup();
        names
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, value)| value.clone())
    }

    fn set_cookie(&mut self, cookie: Cookie<'static>) {
        let path = cookie.path().unwrap_or("/").to_string();
        if is_removal(&cookie) {
            self.remove_cookie(&CookieRemoval {
                name: cookie.name().to_string(),
                domain: cookie.domain().map(str::to_string),
                path,
                secure: cookie.secure().unwrap_or(false),
            });
            return;
        }
        self.insert_cookie(cookie.name(), cookie.value(), cookie.domain(), &path);
    }

    fn remove_cookie(&mut self, removal: &CookieRemoval) {
        let Some(scope) = self.scope_for(removal.domain.as_deref()) else {
            return;
        };
        self.cookies.remove(&CookieKey {
            name: removal.name.clone(),
            scope,
            path: removal.path.clone(),
        });
    }

    fn storage_keys(&self, area: StorageArea) -> Vec<String> {
        self.area(area).keys().cloned().collect()
    }

    fn storage_item(&self, area: StorageArea, key: &str) -> Option<String> {
        self.area(area).get(key).cloned()
    }

    fn set_storage_item(&mut self, area: StorageArea, key: &str, value: &str) {
        self.area_mut(area).insert(key.to_string(), value.to_string());
    }

    fn remove_storage_item(&mut self, area: StorageArea, key: &str) {
        self.area_mut(area).remove(key);
    }
}
