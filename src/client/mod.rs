// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side artifacts: the browser's cookie jar and web storage.
//!
//! The auth layer never touches `document.cookie` or `localStorage` directly.
//! It works against [`ClientContext`], implemented by:
//! - [`HttpContext`], which reads one request and answers with `Set-Cookie`
//!   headers plus a storage directive for the page shim
//! - [`BrowserContext`], an in-memory browser profile

pub mod browser;
pub mod http;

pub use browser::BrowserContext;
pub use http::{
    HttpContext, StorageDirective, StorageSnapshot, CLIENT_STORAGE_HEADER, STORAGE_DIRECTIVE_HEADER,
};

use axum_extra::extract::cookie::{Cookie, SameSite};

/// Web storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// `localStorage`, durable across tabs and restarts
    Local,
    /// `sessionStorage`, scoped to one tab
    Session,
}

/// Removal of one cookie variant.
///
/// Browsers key cookies by exact (name, domain, path); a removal only
/// matches the variant with the same attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRemoval {
    pub name: String,
    /// `None` targets the host-only cookie.
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
}

impl CookieRemoval {
    /// Expired `Set-Cookie` matching this variant.
    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), ""))
            .path(self.path.clone())
            .same_site(SameSite::Lax)
            .secure(self.secure);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        let mut cookie = builder.build();
        cookie.make_removal();
        cookie
    }
}

/// A browser context the auth layer can inspect and mutate.
pub trait ClientContext: Send {
    /// Names of every cookie visible to the page.
    fn cookie_names(&self) -> Vec<String>;

    fn cookie_value(&self, name: &str) -> Option<String>;

    fn set_cookie(&mut self, cookie: Cookie<'static>);

    fn remove_cookie(&mut self, removal: &CookieRemoval);

    fn storage_keys(&self, area: StorageArea) -> Vec<String>;

    fn storage_item(&self, area: StorageArea, key: &str) -> Option<String>;

    fn set_storage_item(&mut self, area: StorageArea, key: &str, value: &str);

    fn remove_storage_item(&mut self, area: StorageArea, key: &str);
}

/// True when a cookie is an expiring `Set-Cookie`.
pub(crate) fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie
        .max_age()
        .map(|age| age <= time::Duration::ZERO)
        .unwrap_or(false)
}
