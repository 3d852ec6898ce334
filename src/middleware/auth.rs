// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page guard middleware.

use crate::client::HttpContext;
use crate::services::{GuardDecision, Page};
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Middleware that runs the navigation guard for `page`.
///
/// On denial the handler never runs: the response is a bare redirect with
/// no body. On success the [`GuardedView`](crate::services::GuardedView)
/// is inserted as a request extension. Cookie changes made while checking
/// (a refreshed token) are appended to the response either way.
pub async fn require_page(
    State((state, page)): State<(Arc<AppState>, Page)>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ctx = HttpContext::from_request(&jar, request.headers());

    match state.guard.check(&mut ctx, page).await {
        GuardDecision::Redirect(to) => (ctx.response_headers(), Redirect::to(to)).into_response(),
        GuardDecision::Allow(view) => {
            request.extensions_mut().insert(*view);
            let response = next.run(request).await;
            (ctx.response_headers(), response).into_response()
        }
    }
}
