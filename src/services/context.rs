// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-tab authentication state.

use super::events::{AuthEvent, AuthEventKind};
use crate::models::{RoleCapabilitySet, Session, SessionInfo};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where a tab stands with respect to authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum TabAuthState {
    /// Initial session fetch has not resolved yet.
    #[default]
    Unknown,
    Anonymous,
    Authenticated,
    AuthenticatedUnverified,
}

impl TabAuthState {
    pub fn from_session(session: Option<&SessionInfo>) -> Self {
        match session {
            None => TabAuthState::Anonymous,
            Some(info) if info.email_confirmed => TabAuthState::Authenticated,
            Some(_) => TabAuthState::AuthenticatedUnverified,
        }
    }

    /// State after `event`. Depends only on the event, so replaying an
    /// event leaves the state unchanged.
    pub fn on_event(self, event: &AuthEvent) -> Self {
        match (event.kind, &event.session) {
            (AuthEventKind::SignedOut, _) => TabAuthState::Anonymous,
            (_, Some(info)) => TabAuthState::from_session(Some(info)),
            (_, None) => self,
        }
    }

    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            TabAuthState::Authenticated | TabAuthState::AuthenticatedUnverified
        )
    }
}

/// In-memory user state held by one tab.
///
/// Role capabilities are cached for the identity they were loaded for and
/// dropped whenever the identity changes.
#[derive(Debug, Default)]
pub struct SessionContext {
    state: TabAuthState,
    session: Option<SessionInfo>,
    roles: Option<RoleCapabilitySet>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of the initial session fetch.
    pub fn resolve(&mut self, session: Option<&Session>) -> TabAuthState {
        let info = session.map(Session::info);
        self.state = TabAuthState::from_session(info.as_ref());
        self.replace_session(info);
        self.state
    }

    pub fn apply(&mut self, event: &AuthEvent) -> TabAuthState {
        self.state = self.state.on_event(event);
        match event.kind {
            AuthEventKind::SignedOut => self.replace_session(None),
            _ => {
                if let Some(info) = &event.session {
                    self.replace_session(Some(info.clone()));
                }
            }
        }
        self.state
    }

    pub fn set_roles(&mut self, roles: RoleCapabilitySet) {
        if self.session.is_some() {
            self.roles = Some(roles);
        }
    }

    /// Drop everything and settle as anonymous.
    pub fn clear(&mut self) {
        self.state = TabAuthState::Anonymous;
        self.session = None;
        self.roles = None;
    }

    pub fn state(&self) -> TabAuthState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn roles(&self) -> Option<&RoleCapabilitySet> {
        self.roles.as_ref()
    }

    fn replace_session(&mut self, info: Option<SessionInfo>) {
        let same_identity = match (&self.session, &info) {
            (Some(old), Some(new)) => old.user_id == new.user_id,
            _ => false,
        };
        if !same_identity {
            self.roles = None;
        }
        self.session = info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(user_id: &str, confirmed: bool) -> SessionInfo {
        SessionInfo {
            user_id: user_id.to_string(),
            email: Some(format!("{user_id}@example.edu")),
            provider: "email".to_string(),
            expires_at: "2026-01-01T00:00:00+00:00".to_string(),
            email_confirmed: confirmed,
        }
    }

    fn event(kind: AuthEventKind, session: Option<SessionInfo>) -> AuthEvent {
        AuthEvent {
            kind,
            user_id: session
                .as_ref()
                .map(|s| s.user_id.clone())
                .unwrap_or_else(|| "u1".to_string()),
            session,
        }
    }

    #[test]
    fn test_unverified_becomes_authenticated_on_confirmation() {
        let mut ctx = SessionContext::new();
        assert_eq!(ctx.state(), TabAuthState::Unknown);

        ctx.apply(&event(AuthEventKind::SignedIn, Some(info("u1", false))));
        assert_eq!(ctx.state(), TabAuthState::AuthenticatedUnverified);

        ctx.apply(&event(AuthEventKind::UserUpdated, Some(info("u1", true))));
        assert_eq!(ctx.state(), TabAuthState::Authenticated);
    }

    #[test]
    fn test_repeated_events_are_idempotent() {
        let mut ctx = SessionContext::new();
        let refreshed = event(AuthEventKind::TokenRefreshed, Some(info("u1", true)));
        let first = ctx.apply(&refreshed);
        let second = ctx.apply(&refreshed);
        assert_eq!(first, second);

        let out = event(AuthEventKind::SignedOut, None);
        ctx.apply(&out);
        assert_eq!(ctx.apply(&out), TabAuthState::Anonymous);
        assert!(ctx.session().is_none());
    }

    #[test]
    fn test_roles_dropped_on_identity_change() {
        let mut ctx = SessionContext::new();
        ctx.apply(&event(AuthEventKind::SignedIn, Some(info("u1", true))));
        ctx.set_roles(RoleCapabilitySet {
            student: true,
            ..Default::default()
        });

        ctx.apply(&event(AuthEventKind::TokenRefreshed, Some(info("u1", true))));
        assert!(ctx.roles().is_some());

        ctx.apply(&event(AuthEventKind::SignedIn, Some(info("u2", true))));
        assert!(ctx.roles().is_none());
    }

    #[test]
    fn test_roles_ignored_without_session() {
        let mut ctx = SessionContext::new();
        ctx.resolve(None);
        assert_eq!(ctx.state(), TabAuthState::Anonymous);
        ctx.set_roles(RoleCapabilitySet::default());
        assert!(ctx.roles().is_none());
    }
}
