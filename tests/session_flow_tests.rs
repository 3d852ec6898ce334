// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end session lifecycle tests over HTTP.
//!
//! These tests verify that:
//! 1. Sign-in, logout and a second sign-in leave only the new identity's cookies
//! 2. OAuth start sweeps stale auth cookies and honours the account-chooser flag
//! 3. Logout is idempotent and revokes the session everywhere
//! 4. Email confirmation and password recovery links finish through the callback
//! 5. Session-changing routes refuse requests started by another site

use axum::http::StatusCode;
use sipet_portal::client::STORAGE_DIRECTIVE_HEADER;
use sipet_portal::services::tokens::pkce_challenge;
use sipet_portal::store::{EmailKind, MemoryStore, SentEmail};
use std::time::Duration;
use tokio_stream::StreamExt;

mod common;

use common::{body_json, create_test_app, TestBrowser};

const ACCESS: &str = "sb-local-auth-token";
const REFRESH: &str = "sb-local-refresh-token";
const VERIFIER: &str = "sb-local-code-verifier";
const LEDGER: &str = "sb-local-auth-ledger";

#[tokio::test]
async fn test_sign_in_sets_session_cookies() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();

    let response = browser.sign_in(&app, "ana@example.edu", "secreto").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/dashboard");
    assert_eq!(body["session"]["email"], "ana@example.edu");

    assert!(browser.get(ACCESS).is_some());
    assert!(browser.get(REFRESH).is_some());
    assert!(browser.get(LEDGER).is_some());

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "authenticated");
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();

    let response = browser.sign_in(&app, "ana@example.edu", "incorrecto").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(browser.get(ACCESS).is_none());
}

#[tokio::test]
async fn test_logout_then_sign_in_as_other_user_leaves_no_residue() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let beto = memory.create_user("beto@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();

    browser.sign_in(&app, "ana@example.edu", "secreto").await;
    let ana_token = browser.get(ACCESS).map(str::to_string);

    let response = browser.send(&app, "POST", "/auth/logout", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["redirect"], "/?logout=true");
    assert_eq!(outcome["full_reload"], true);
    assert_eq!(outcome["remote"], "revoked");
    assert!(browser.names().is_empty(), "left over: {:?}", browser.names());

    browser.sign_in(&app, "beto@example.edu", "secreto").await;
    let mut names = browser.names();
    names.sort();
    assert_eq!(names, vec![LEDGER, ACCESS, REFRESH]);
    assert_ne!(browser.get(ACCESS).map(str::to_string), ana_token);

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["session"]["user_id"], beto.as_str());
}

#[tokio::test]
async fn test_logout_revokes_token_for_replay() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();
    browser.sign_in(&app, "ana@example.edu", "secreto").await;

    // A second device holding the same cookies.
    let mut copy = browser.clone();

    browser.send(&app, "POST", "/auth/logout", None).await;

    let session = body_json(copy.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "anonymous");
    assert!(session["session"].is_null());
    // The dead cookies are dropped rather than replayed on every request.
    assert!(copy.names().is_empty(), "left over: {:?}", copy.names());
}

#[tokio::test]
async fn test_logout_twice_is_harmless() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();
    browser.sign_in(&app, "ana@example.edu", "secreto").await;

    let first = body_json(browser.send(&app, "POST", "/auth/logout", None).await).await;
    let response = browser.send(&app, "POST", "/auth/logout", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;

    assert_eq!(first["redirect"], second["redirect"]);
    assert_eq!(second["remote"], "skipped");
    assert!(browser.names().is_empty());
}

#[tokio::test]
async fn test_oauth_start_sweeps_stale_cookies() {
    let (app, _, _) = create_test_app();
    let mut browser = TestBrowser::new();
    browser.insert("sb-access-token", "stale");
    browser.insert("supabase-auth-token", "stale");
    browser.insert("theme", "dark");

    let response = browser.send(&app, "GET", "/auth/oauth/google", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let url = body["url"].as_str().unwrap();
    assert!(url.contains("provider=google"));
    assert!(url.contains("code_challenge_method=s256"));
    assert_eq!(body["select_account"], false);

    assert!(browser.get("sb-access-token").is_none());
    assert!(browser.get("supabase-auth-token").is_none());
    assert_eq!(browser.get("theme"), Some("dark"));
    assert!(browser.get(VERIFIER).is_some());
}

#[tokio::test]
async fn test_oauth_after_logout_forces_account_chooser() {
    let (app, _, _) = create_test_app();
    let mut browser = TestBrowser::new();
    browser.set_local_storage(&[("sipet-force-account-chooser", "true")]);

    let response = browser.send(&app, "GET", "/auth/oauth/google", None).await;
    let directive = response
        .headers()
        .get(STORAGE_DIRECTIVE_HEADER)
        .map(|v| urlencoding::decode(v.to_str().unwrap()).unwrap().into_owned())
        .expect("storage directive");
    let body = body_json(response).await;

    assert_eq!(body["select_account"], true);
    assert!(body["url"].as_str().unwrap().ends_with("&prompt=select_account"));
    let directive: serde_json::Value = serde_json::from_str(&directive).unwrap();
    assert!(directive["remove"]["local"]
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k == "sipet-force-account-chooser"));
}

#[tokio::test]
async fn test_oauth_callback_completes_sign_in() {
    let (app, _, memory) = create_test_app();
    let mut browser = TestBrowser::new();

    browser.send(&app, "GET", "/auth/oauth/google", None).await;
    let verifier = browser.get(VERIFIER).expect("verifier cookie").to_string();
    let code = memory.grant_oauth_code("carla@example.edu", "google", &pkce_challenge(&verifier));

    let response = browser
        .send(&app, "GET", &format!("/auth/callback?code={code}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&response), "/dashboard");
    assert!(browser.get(ACCESS).is_some());
    assert!(browser.get(VERIFIER).is_none());
}

#[tokio::test]
async fn test_callback_without_verifier_fails_closed() {
    let (app, _, memory) = create_test_app();
    let code = memory.grant_oauth_code("carla@example.edu", "google", "challenge");
    let mut browser = TestBrowser::new();

    let response = browser
        .send(&app, "GET", &format!("/auth/callback?code={code}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&response), "/?error=auth_callback");
    assert!(browser.get(ACCESS).is_none());

    let response = browser.send(&app, "GET", "/auth/callback", None).await;
    assert_eq!(common::location(&response), "/?error=missing_code");
}

#[tokio::test]
async fn test_unconfirmed_email_lands_on_pending_notice() {
    let (app, _, memory) = create_test_app();
    memory.set_allow_unverified(true);
    memory.create_user("dani@example.edu", "secreto", false);
    let mut browser = TestBrowser::new();

    let body = body_json(browser.sign_in(&app, "dani@example.edu", "secreto").await).await;
    assert_eq!(body["redirect"], "/?email_pending=true");

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "authenticated_unverified");
}

#[tokio::test]
async fn test_unconfirmed_email_sign_in_points_to_pending_notice() {
    let (app, _, memory) = create_test_app();
    memory.create_user("dani@example.edu", "secreto", false);
    let mut browser = TestBrowser::new();

    let response = browser.sign_in(&app, "dani@example.edu", "secreto").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "email_not_confirmed");
    assert_eq!(body["redirect"], "/?email_pending=true");
    assert!(browser.get(ACCESS).is_none());
}

fn last_email(memory: &MemoryStore, kind: EmailKind, email: &str) -> SentEmail {
    memory
        .sent_emails()
        .into_iter()
        .rev()
        .find(|sent| sent.kind == kind && sent.email == email)
        .expect("email queued")
}

#[tokio::test]
async fn test_sign_up_then_confirmation_link_verifies_session() {
    let (app, _, memory) = create_test_app();
    memory.set_allow_unverified(true);
    let mut browser = TestBrowser::new();

    let response = browser
        .send(
            &app,
            "POST",
            "/auth/sign-up",
            Some(serde_json::json!({ "email": "eva@example.edu", "password": "secreto" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["confirmation_pending"], true);
    assert_eq!(body["redirect"], "/?email_pending=true");

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "authenticated_unverified");

    let email = last_email(&memory, EmailKind::Confirmation, "eva@example.edu");
    assert!(email.redirect_to.ends_with("/auth/callback"));
    let response = browser
        .send(&app, "GET", &format!("/auth/callback?code={}", email.code), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&response), "/dashboard");

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "authenticated");
    assert_eq!(session["session"]["email"], "eva@example.edu");
}

#[tokio::test]
async fn test_sign_up_without_session_waits_for_confirmation() {
    let (app, _, memory) = create_test_app();
    let mut browser = TestBrowser::new();

    let body = body_json(
        browser
            .send(
                &app,
                "POST",
                "/auth/sign-up",
                Some(serde_json::json!({ "email": "eva@example.edu", "password": "secreto" })),
            )
            .await,
    )
    .await;
    assert_eq!(body["confirmation_pending"], true);
    assert!(browser.get(ACCESS).is_none());
    assert!(browser.get(VERIFIER).is_some());

    let email = last_email(&memory, EmailKind::Confirmation, "eva@example.edu");
    let response = browser
        .send(&app, "GET", &format!("/auth/callback?code={}", email.code), None)
        .await;
    assert_eq!(common::location(&response), "/dashboard");

    // Confirmed now, so password sign-in works from a fresh browser.
    let mut other = TestBrowser::new();
    let response = other.sign_in(&app, "eva@example.edu", "secreto").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_recovery_link_allows_new_password() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();

    let response = browser
        .send(
            &app,
            "POST",
            "/auth/password-reset",
            Some(serde_json::json!({ "email": "ana@example.edu" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let email = last_email(&memory, EmailKind::Recovery, "ana@example.edu");
    assert!(email.redirect_to.ends_with("/auth/callback?next=%2Freset-password"));
    let response = browser
        .send(
            &app,
            "GET",
            &format!("/auth/callback?code={}&next=%2Freset-password", email.code),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&response), "/reset-password");
    assert!(browser.get(ACCESS).is_some());

    let response = browser
        .send(
            &app,
            "POST",
            "/auth/reset-password",
            Some(serde_json::json!({ "password": "nuevo-secreto" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut other = TestBrowser::new();
    let response = other.sign_in(&app, "ana@example.edu", "secreto").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = other.sign_in(&app, "ana@example.edu", "nuevo-secreto").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_resend_verification_queues_email_for_unconfirmed_account() {
    let (app, _, memory) = create_test_app();
    memory.create_user("dani@example.edu", "secreto", false);
    let mut browser = TestBrowser::new();

    for email in ["dani@example.edu", "nadie@example.edu"] {
        let response = browser
            .send(
                &app,
                "POST",
                "/auth/resend-verification",
                Some(serde_json::json!({ "email": email })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{email}");
        assert_eq!(body_json(response).await["ok"], true);
    }

    let sent = memory.sent_emails();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, EmailKind::Confirmation);
    assert_eq!(sent[0].email, "dani@example.edu");
}

#[tokio::test]
async fn test_event_stream_delivers_only_own_sign_out() {
    let (app, _, memory) = create_test_app();
    let ana = memory.create_user("ana@example.edu", "secreto", true);
    let beto = memory.create_user("beto@example.edu", "secreto", true);
    let mut ana_tab = TestBrowser::new();
    let mut beto_tab = TestBrowser::new();
    ana_tab.sign_in(&app, "ana@example.edu", "secreto").await;
    beto_tab.sign_in(&app, "beto@example.edu", "secreto").await;

    let mut listener = ana_tab.clone();
    let response = listener.send(&app, "GET", "/auth/events", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut frames = response.into_body().into_data_stream();

    beto_tab.send(&app, "POST", "/auth/logout", None).await;
    ana_tab.send(&app, "POST", "/auth/logout", None).await;

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("event delivered")
        .expect("stream open")
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.starts_with("event: auth"), "{text}");
    assert!(text.contains("SIGNED_OUT"), "{text}");
    assert!(text.contains(ana.as_str()), "{text}");
    assert!(!text.contains(beto.as_str()), "{text}");
}

#[tokio::test]
async fn test_event_stream_needs_a_session() {
    let (app, _, _) = create_test_app();
    let mut browser = TestBrowser::new();

    let response = browser.send(&app, "GET", "/auth/events", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cross_site_logout_is_refused() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();
    browser.sign_in(&app, "ana@example.edu", "secreto").await;

    let response = browser
        .send_with_headers(
            &app,
            "POST",
            "/auth/logout",
            None,
            &[("origin", "https://evil.example.com")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(browser.get(ACCESS).is_some());

    let response = browser
        .send_with_headers(
            &app,
            "POST",
            "/auth/logout",
            None,
            &[("sec-fetch-site", "cross-site")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let session = body_json(browser.send(&app, "GET", "/auth/session", None).await).await;
    assert_eq!(session["state"], "authenticated");

    let response = browser
        .send_with_headers(
            &app,
            "POST",
            "/auth/logout",
            None,
            &[("origin", "http://localhost:3000"), ("sec-fetch-site", "same-origin")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(browser.names().is_empty());
}

#[tokio::test]
async fn test_cross_site_oauth_start_keeps_cookies() {
    let (app, _, memory) = create_test_app();
    memory.create_user("ana@example.edu", "secreto", true);
    let mut browser = TestBrowser::new();
    browser.sign_in(&app, "ana@example.edu", "secreto").await;

    let response = browser
        .send_with_headers(
            &app,
            "GET",
            "/auth/oauth/google",
            None,
            &[("sec-fetch-site", "cross-site")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(browser.get(ACCESS).is_some());
    assert!(browser.get(VERIFIER).is_none());
}
