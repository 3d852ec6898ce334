// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod artifacts;
pub mod context;
pub mod events;
pub mod guard;
pub mod logout;
pub mod onboarding;
pub mod roles;
pub mod session_manager;
pub mod tokens;

pub use artifacts::{ArtifactScrubber, FORCE_ACCOUNT_CHOOSER_KEY};
pub use context::{SessionContext, TabAuthState};
pub use events::{AuthEvent, AuthEventKind, SessionEvents, Subscription};
pub use guard::{GuardDecision, GuardedView, NavigationGuard, Page};
pub use logout::{LogoutController, LogoutOutcome};
pub use onboarding::{OnboardingService, OnboardingWizard, RoleChoice};
pub use roles::RoleResolver;
pub use session_manager::{AuthSessionManager, CallbackKind, OAuthRedirect};
