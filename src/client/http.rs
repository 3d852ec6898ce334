// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client context backed by a single HTTP exchange.
//!
//! Cookies are read from the request and written back as `Set-Cookie`
//! headers. Each variant is its own header, so several removals of one name
//! (host-only, `Domain=host`, `Domain=.host`) all reach the browser.
//!
//! Web storage is invisible to the server. The page shim reports the
//! auth-related entries it holds in `X-Client-Storage` and applies the
//! `X-Client-Storage-Directive` returned on every response. Both carry
//! percent-encoded JSON.

use super::{is_removal, ClientContext, CookieRemoval, StorageArea};
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::AppendHeaders;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request header carrying the page's auth-related storage entries.
pub const CLIENT_STORAGE_HEADER: &str = "x-client-storage";

/// Response header carrying storage mutations for the page shim.
pub const STORAGE_DIRECTIVE_HEADER: &str = "x-client-storage-directive";

/// Storage entries per area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub local: BTreeMap<String, String>,
    #[serde(default)]
    pub session: BTreeMap<String, String>,
}

impl StorageSnapshot {
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

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.session.is_empty()
    }
}

/// Keys to delete per area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRemovals {
    #[serde(default)]
    pub local: Vec<String>,
    #[serde(default)]
    pub session: Vec<String>,
}

impl StorageRemovals {
    fn area_mut(&mut self, area: StorageArea) -> &mut Vec<String> {
        match area {
            StorageArea::Local => &mut self.local,
            StorageArea::Session => &mut self.session,
        }
    }
}

/// Storage mutations the page shim must apply, removals first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDirective {
    pub remove: StorageRemovals,
    pub set: StorageSnapshot,
}

impl StorageDirective {
    pub fn is_empty(&self) -> bool {
        self.remove.local.is_empty() && self.remove.session.is_empty() && self.set.is_empty()
    }
}

/// Client context for one request/response pair.
#[derive(Debug, Default)]
pub struct HttpContext {
    cookies: BTreeMap<String, String>,
    storage: StorageSnapshot,
    outgoing: Vec<Cookie<'static>>,
    directive: StorageDirective,
}

impl HttpContext {
    pub fn from_request(jar: &CookieJar, headers: &HeaderMap) -> Self {
        let cookies = jar
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        let storage = headers
            .get(CLIENT_STORAGE_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|raw| match decode_snapshot(raw) {
                Some(snapshot) => Some(snapshot),
                None => {
                    tracing::debug!("Ignoring malformed client storage header");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            cookies,
            storage,
            ..Default::default()
        }
    }

    /// `Set-Cookie` headers in the order they were produced.
    pub fn outgoing_cookies(&self) -> &[Cookie<'static>] {
        &self.outgoing
    }

    pub fn storage_directive(&self) -> &StorageDirective {
        &self.directive
    }

    /// Response headers carrying every cookie and storage mutation.
    pub fn response_headers(&self) -> AppendHeaders<Vec<(HeaderName, String)>> {
        let mut headers: Vec<(HeaderName, String)> = self
            .outgoing
            .iter()
            .map(|cookie| (header::SET_COOKIE, cookie.to_string()))
            .collect();

        if !self.directive.is_empty() {
            match serde_json::to_string(&self.directive) {
                Ok(json) => headers.push((
                    HeaderName::from_static(STORAGE_DIRECTIVE_HEADER),
                    urlencoding::encode(&json).into_owned(),
                )),
                Err(e) => tracing::error!(error = %e, "Failed to encode storage directive"),
            }
        }

        AppendHeaders(headers)
    }
}

fn decode_snapshot(raw: &str) -> Option<StorageSnapshot> {
    let json = urlencoding::decode(raw).ok()?;
    serde_json::from_str(&json).ok()
}

impl ClientContext for HttpContext {
    fn cookie_names(&self) -> Vec<String> {
        self.cookies.keys().cloned().collect()
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn set_cookie(&mut self, cookie: Cookie<'static>) {
        if is_removal(&cookie) {
            self.cookies.remove(cookie.name());
        } else {
            self.cookies
                .insert(cookie.name().to_string(), cookie.value().to_string());
        }
        self.outgoing.push(cookie);
    }

    fn remove_cookie(&mut self, removal: &CookieRemoval) {
        self.set_cookie(removal.to_cookie());
    }

    fn storage_keys(&self, area: StorageArea) -> Vec<String> {
        self.storage.area(area).keys().cloned().collect()
    }

    fn storage_item(&self, area: StorageArea, key: &str) -> Option<String> {
        self.storage.area(area).get(key).cloned()
    }

    fn set_storage_item(&mut self, area: StorageArea, key: &str, value: &str) {
        self.storage
            .area_mut(area)
            .insert(key.to_string(), value.to_string());
        self.directive.remove.area_mut(area).retain(|k| k != key);
        self.directive
            .set
            .area_mut(area)
            .insert(key.to_string(), value.to_string());
    }

    fn remove_storage_item(&mut self, area: StorageArea, key: &str) {
        self.storage.area_mut(area).remove(key);
        self.directive.set.area_mut(area).remove(key);
        let removals = self.directive.remove.area_mut(area);
        if !removals.iter().any(|k| k == key) {
            removals.push(key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request_headers(cookie: &str, storage_json: Option<&str>) -> (CookieJar, HeaderMap) {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        if let Some(json) = storage_json {
            let encoded = urlencoding::encode(json).into_owned();
            headers.insert(
                CLIENT_STORAGE_HEADER,
                HeaderValue::from_str(&encoded).unwrap(),
            );
        }
        (CookieJar::from_headers(&headers), headers)
    }

    #[test]
    fn test_reads_cookies_and_storage() {
        let (jar, headers) = request_headers(
            "sb-local-auth-token=abc; theme=dark",
            Some(r#"{"local":{"sb-local-auth-token":"x"}}"#),
        );
        let ctx = HttpContext::from_request(&jar, &headers);

        assert_eq!(ctx.cookie_value("sb-local-auth-token").as_deref(), Some("abc"));
        assert_eq!(ctx.cookie_names().len(), 2);
        assert_eq!(
            ctx.storage_keys(StorageArea::Local),
            vec!["sb-local-auth-token".to_string()]
        );
        assert!(ctx.storage_keys(StorageArea::Session).is_empty());
    }

    #[test]
    fn test_each_removal_variant_is_its_own_header() {
        let (jar, headers) = request_headers("sb-x-auth-token=abc", None);
        let mut ctx = HttpContext::from_request(&jar, &headers);

        for domain in [None, Some("sipet.example.edu"), Some(".sipet.example.edu")] {
            ctx.remove_cookie(&CookieRemoval {
                name: "sb-x-auth-token".to_string(),
                domain: domain.map(str::to_string),
                path: "/".to_string(),
                secure: true,
            });
        }

        assert!(ctx.cookie_value("sb-x-auth-token").is_none());
        let AppendHeaders(out) = ctx.response_headers();
        let set_cookies: Vec<&String> = out
            .iter()
            .filter(|(name, _)| *name == header::SET_COOKIE)
            .map(|(_, value)| value)
            .collect();
        assert_eq!(set_cookies.len(), 3);
        assert!(set_cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn test_storage_directive_tracks_last_write() {
        let (jar, headers) = request_headers("a=b", None);
        let mut ctx = HttpContext::from_request(&jar, &headers);

        ctx.remove_storage_item(StorageArea::Local, "flag");
        ctx.set_storage_item(StorageArea::Local, "flag", "true");
        ctx.remove_storage_item(StorageArea::Session, "sb-x-auth-token");
        ctx.remove_storage_item(StorageArea::Session, "sb-x-auth-token");

        let directive = ctx.storage_directive();
        assert!(directive.remove.local.is_empty());
        assert_eq!(directive.set.local.get("flag").map(String::as_str), Some("true"));
        assert_eq!(directive.remove.session, vec!["sb-x-auth-token".to_string()]);
    }

    #[test]
    fn test_malformed_storage_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_STORAGE_HEADER, HeaderValue::from_static("not-json"));
        let ctx = HttpContext::from_request(&CookieJar::from_headers(&headers), &headers);
        assert!(ctx.storage_keys(StorageArea::Local).is_empty());
    }
}
