// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Navigation Guard.
//!
//! Decides, before any protected content is produced, whether a page may
//! render for the client's current session. Checks run in order:
//! 1. session present (and email confirmed)
//! 2. profile row present
//! 3. onboarding state against the page's setup policy
//! 4. the page's role requirement
//!
//! Any error along the way denies access. The guard never writes.

use super::roles::RoleResolver;
use super::session_manager::AuthSessionManager;
use crate::client::ClientContext;
use crate::error::ProfileError;
use crate::models::{Role, RoleCapabilitySet, Session, UserProfile};

pub const LANDING_PATH: &str = "/";
pub const EMAIL_PENDING_PATH: &str = "/?email_pending=true";
pub const PROFILE_MISSING_PATH: &str = "/?error=profile_not_found";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ONBOARDING_REDIRECT_PATH: &str = "/dashboard?onboarding=true";

/// Guarded pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Dashboard,
    Tesista,
    Docente,
    Coordinador,
    Admin,
    Onboarding,
}

/// What to do with a profile that has no role yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPolicy {
    /// Send the user to the dashboard's onboarding.
    Redirect,
    /// Render the page with onboarding in place of its content.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePolicy {
    /// Any one of these grants access; empty means any session.
    pub any_of: &'static [Role],
    pub setup: SetupPolicy,
}

impl Page {
    /// Role portals in dashboard order.
    pub const PORTALS: [Page; 4] = [Page::Tesista, Page::Docente, Page::Coordinador, Page::Admin];

    pub fn path(self) -> &'static str {
        match self {
            Page::Dashboard => DASHBOARD_PATH,
            Page::Tesista => "/tesista",
            Page::Docente => "/docente",
            Page::Coordinador => "/coordinador",
            Page::Admin => "/admin",
            Page::Onboarding => "/onboarding",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Panel principal",
            Page::Tesista => "Portal del Tesista",
            Page::Docente => "Portal del Docente",
            Page::Coordinador => "Portal del Coordinador",
            Page::Admin => "Administración",
            Page::Onboarding => "Completa tu perfil",
        }
    }

    pub fn policy(self) -> PagePolicy {
        match self {
            Page::Dashboard | Page::Onboarding => PagePolicy {
                any_of: &[],
                setup: SetupPolicy::Inline,
            },
            Page::Tesista => PagePolicy {
                any_of: &[Role::Student],
                setup: SetupPolicy::Redirect,
            },
            Page::Docente => PagePolicy {
                any_of: &[Role::Advisor, Role::Reviewer],
                setup: SetupPolicy::Redirect,
            },
            Page::Coordinador => PagePolicy {
                any_of: &[Role::Coordinator],
                setup: SetupPolicy::Redirect,
            },
            Page::Admin => PagePolicy {
                any_of: &[Role::Administrator],
                setup: SetupPolicy::Redirect,
            },
        }
    }

    /// Whether `roles` satisfies this page's role requirement.
    pub fn allows(self, roles: &RoleCapabilitySet) -> bool {
        let policy = self.policy();
        policy.any_of.is_empty() || roles.has_any(policy.any_of)
    }
}

/// Everything a guarded page may render from.
#[derive(Debug, Clone)]
pub struct GuardedView {
    pub page: Page,
    pub session: Session,
    pub profile: UserProfile,
    pub roles: RoleCapabilitySet,
}

impl GuardedView {
    pub fn onboarding_required(&self) -> bool {
        self.roles.needs_setup
    }
}

#[derive(Debug, Clone)]
pub enum GuardDecision {
    Allow(Box<GuardedView>),
    Redirect(&'static str),
}

#[derive(Clone)]
pub struct NavigationGuard {
    sessions: AuthSessionManager,
    roles: RoleResolver,
}

impl NavigationGuard {
    pub fn new(sessions: AuthSessionManager, roles: RoleResolver) -> Self {
        Self { sessions, roles }
    }

    pub async fn check(&self, ctx: &mut dyn ClientContext, page: Page) -> GuardDecision {
        let session = match self.sessions.get_current_session(ctx).await {
            Ok(Some(session)) => session,
            Ok(None) => return GuardDecision::Redirect(LANDING_PATH),
            Err(e) => {
                tracing::warn!(page = page.path(), error = %e, "Session check failed, denying");
                return GuardDecision::Redirect(LANDING_PATH);
            }
        };

        if session.pending_verification() {
            return GuardDecision::Redirect(EMAIL_PENDING_PATH);
        }

        let profile = match self.roles.load_profile(&session).await {
            Ok(profile) => profile,
            Err(ProfileError::ProfileNotFound(_)) => return GuardDecision::Redirect(PROFILE_MISSING_PATH),
            Err(e) => {
                tracing::warn!(subject = %session.user_id, page = page.path(), error = %e, "Role lookup failed, denying");
                return GuardDecision::Redirect(LANDING_PATH);
            }
        };
        let roles = RoleCapabilitySet::from_flags(&profile.roles);

        if roles.needs_setup {
            if page.policy().setup == SetupPolicy::Redirect {
                return GuardDecision::Redirect(ONBOARDING_REDIRECT_PATH);
            }
        } else if !page.allows(&roles) {
            tracing::info!(subject = %session.user_id, page = page.path(), "Role not held, redirecting");
            return GuardDecision::Redirect(DASHBOARD_PATH);
        }

        GuardDecision::Allow(Box::new(GuardedView {
            page,
            session,
            profile,
            roles,
        }))
    }
}
