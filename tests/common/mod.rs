// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use serde_json::Value;
use sipet_portal::client::CLIENT_STORAGE_HEADER;
use sipet_portal::config::Config;
use sipet_portal::routes::create_router;
use sipet_portal::store::{MemoryStore, SessionStore};
use sipet_portal::AppState;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Create a test app backed by an in-memory Session Store.
/// Returns the router, the shared state and a handle on the store.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>, MemoryStore) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (Router, Arc<AppState>, MemoryStore) {
    let memory = MemoryStore::new(&config.jwt_secret);
    let store = SessionStore::new_mock(&config, memory.clone());
    let state = Arc::new(AppState::new(config, store));
    (create_router(state.clone()), state, memory)
}

/// Cookie jar of one simulated browser, fed from `Set-Cookie` headers.
#[derive(Debug, Default, Clone)]
pub struct TestBrowser {
    cookies: BTreeMap<String, String>,
    storage_header: Option<String>,
}

#[allow(dead_code)]
impl TestBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn names(&self) -> Vec<String> {
        self.cookies.keys().cloned().collect()
    }

    /// Send `local` as the page's storage snapshot on later requests.
    pub fn set_local_storage(&mut self, local: &[(&str, &str)]) {
        let local: BTreeMap<&str, &str> = local.iter().copied().collect();
        let json = serde_json::json!({ "local": local }).to_string();
        self.storage_header = Some(urlencoding::encode(&json).into_owned());
    }

    /// Apply every `Set-Cookie` header in order.
    pub fn absorb<B>(&mut self, response: &Response<B>) {
        for raw in set_cookie_headers(response) {
            let cookie = Cookie::parse(raw).expect("valid Set-Cookie");
            let expired = cookie
                .max_age()
                .map(|age| age <= time::Duration::ZERO)
                .unwrap_or(false);
            if expired {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn request(&self, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            builder = builder.header(header::COOKIE, self.cookie_header());
        }
        if let Some(storage) = &self.storage_header {
            builder = builder.header(CLIENT_STORAGE_HEADER, storage.as_str());
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// Send a request and keep whatever cookies come back.
    pub async fn send(
        &mut self,
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.send_with_headers(app, method, uri, body, &[]).await
    }

    pub async fn send_with_headers(
        &mut self,
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        let mut request = self.request(method, uri, body);
        for (name, value) in headers {
            request.headers_mut().insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                axum::http::HeaderValue::from_str(value).unwrap(),
            );
        }
        let response = app.clone().oneshot(request).await.unwrap();
        self.absorb(&response);
        response
    }

    pub async fn sign_in(&mut self, app: &Router, email: &str, password: &str) -> Response<Body> {
        self.send(
            app,
            "POST",
            "/auth/sign-in",
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }
}

#[allow(dead_code)]
pub fn set_cookie_headers<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
