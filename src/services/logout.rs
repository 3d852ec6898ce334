// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Logout from the portal header.
//!
//! Every step is best-effort: a failure is logged and the next step runs
//! anyway. The final navigation always happens, so a second logout lands in
//! the same place as the first.

use super::artifacts::FORCE_ACCOUNT_CHOOSER_KEY;
use super::context::SessionContext;
use super::session_manager::AuthSessionManager;
use crate::client::{ClientContext, StorageArea};
use crate::error::AuthError;
use crate::models::SignOutScope;
use serde::Serialize;

/// Landing page after logout. Always a full-page load.
pub const LOGOUT_REDIRECT: &str = "/?logout=true";

/// Result of a remote sign-out attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSignOut {
    Revoked,
    AlreadyLoggedOut,
    /// No access token in the client; nothing to revoke.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutOutcome {
    pub redirect: &'static str,
    pub full_reload: bool,
    pub remote: RemoteSignOut,
    pub cookies_removed: Vec<String>,
    pub storage_keys_removed: usize,
}

#[derive(Clone)]
pub struct LogoutController {
    sessions: AuthSessionManager,
}

impl LogoutController {
    pub fn new(sessions: AuthSessionManager) -> Self {
        Self { sessions }
    }

    pub async fn logout(
        &self,
        ctx: &mut dyn ClientContext,
        session_ctx: &mut SessionContext,
    ) -> LogoutOutcome {
        let scrubber = self.sessions.scrubber();

        // Revoke every session of the identity, on every device.
        let remote = match ctx.cookie_value(&scrubber.names().access) {
            None => RemoteSignOut::Skipped,
            Some(token) => match self.sessions.sign_out(&token, SignOutScope::Global).await {
                Ok(()) => RemoteSignOut::Revoked,
                Err(AuthError::AlreadyLoggedOut) => RemoteSignOut::AlreadyLoggedOut,
                Err(e) => {
                    tracing::warn!(error = %e, "Remote sign-out failed, continuing local cleanup");
                    RemoteSignOut::Failed
                }
            },
        };

        let cookies_removed = scrubber.scrub_cookies(ctx);

        // Next OAuth sign-in must show the provider's account picker.
        ctx.set_storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY, "true");

        let storage_keys_removed = scrubber.scrub_storage(ctx).len();

        session_ctx.clear();

        tracing::info!(
            remote = ?remote,
            cookies = cookies_removed.len(),
            storage_keys = storage_keys_removed,
            "Logged out"
        );

        LogoutOutcome {
            redirect: LOGOUT_REDIRECT,
            full_reload: true,
            remote,
            cookies_removed,
            storage_keys_removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BrowserContext;
    use crate::config::Config;
    use crate::services::context::TabAuthState;
    use crate::services::events::SessionEvents;
    use crate::store::{MemoryStore, SessionStore};

    fn setup() -> (LogoutController, AuthSessionManager, MemoryStore) {
        let config = Config::test_default();
        let memory = MemoryStore::new(&config.jwt_secret);
        let store = SessionStore::new_mock(&config, memory.clone());
        let sessions = AuthSessionManager::new(&config, store, SessionEvents::new());
        (LogoutController::new(sessions.clone()), sessions, memory)
    }

    #[tokio::test]
    async fn test_logout_twice_lands_in_same_state() {
        let (logout, sessions, memory) = setup();
        let user_id = memory.create_user("ana@example.edu", "pw", true);
        let mut browser = BrowserContext::new("localhost");
        browser.set_storage_item(StorageArea::Session, "supabase.auth.token", "{}");
        let session = sessions
            .sign_in_with_password(&mut browser, "ana@example.edu", "pw")
            .await
            .unwrap();
        let mut tab = SessionContext::new();
        tab.resolve(Some(&session));

        let first = logout.logout(&mut browser, &mut tab).await;
        assert_eq!(first.remote, RemoteSignOut::Revoked);
        assert_eq!(memory.active_sessions(&user_id), 0);
        assert!(browser.cookie_names().is_empty());
        assert_eq!(
            browser.storage_item(StorageArea::Local, FORCE_ACCOUNT_CHOOSER_KEY),
            Some("true".to_string())
        );
        assert_eq!(tab.state(), TabAuthState::Anonymous);

        let second = logout.logout(&mut browser, &mut tab).await;
        assert_eq!(second.remote, RemoteSignOut::Skipped);
        assert_eq!(second.redirect, first.redirect);
        assert!(browser.cookie_names().is_empty());
        assert_eq!(tab.state(), TabAuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_store_outage_still_cleans_up() {
        let (logout, sessions, memory) = setup();
        memory.create_user("ana@example.edu", "pw", true);
        let mut browser = BrowserContext::new("localhost");
        sessions
            .sign_in_with_password(&mut browser, "ana@example.edu", "pw")
            .await
            .unwrap();
        memory.set_offline(true);

        let outcome = logout.logout(&mut browser, &mut SessionContext::new()).await;
        assert_eq!(outcome.remote, RemoteSignOut::Failed);
        assert_eq!(outcome.redirect, LOGOUT_REDIRECT);
        assert!(outcome.full_reload);
        assert!(browser.cookie_names().is_empty());
    }
}
