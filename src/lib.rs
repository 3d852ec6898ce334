// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! SIPeT portal: authentication sessions and role-gated navigation
//!
//! This crate provides the backend-for-frontend that signs users in against
//! Supabase, keeps their browser free of stale auth artifacts, and decides
//! which portal pages each role may open.

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use config::Config;
use services::{
    AuthSessionManager, LogoutController, NavigationGuard, OnboardingService, RoleResolver,
    SessionEvents,
};
use store::SessionStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: AuthSessionManager,
    pub guard: NavigationGuard,
    pub onboarding: OnboardingService,
    pub logout: LogoutController,
}

impl AppState {
    pub fn new(config: Config, store: SessionStore) -> Self {
        let sessions = AuthSessionManager::new(&config, store.clone(), SessionEvents::new());
        let guard = NavigationGuard::new(sessions.clone(), RoleResolver::new(store.clone()));
        Self {
            onboarding: OnboardingService::new(store),
            logout: LogoutController::new(sessions.clone()),
            guard,
            sessions,
            config,
        }
    }
}
