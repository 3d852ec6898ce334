// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Guarded page data: dashboard, role portals and onboarding.
//!
//! Every route here sits behind [`require_page`]; handlers only run for a
//! session the guard already accepted for that page.

use crate::error::{AppError, Result};
use crate::middleware::require_page;
use crate::models::{RoleCapabilitySet, UserProfile};
use crate::services::onboarding::{OnboardingError, OnboardingStep};
use crate::services::{GuardedView, OnboardingWizard, Page, RoleChoice};
use crate::AppState;
use axum::{
    extract::{Query, State},
    middleware,
    routing::{get, post, MethodRouter},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", guarded(state, Page::Dashboard, get(dashboard)))
        .route("/tesista", guarded(state, Page::Tesista, get(portal)))
        .route("/docente", guarded(state, Page::Docente, get(portal)))
        .route("/coordinador", guarded(state, Page::Coordinador, get(portal)))
        .route("/admin", guarded(state, Page::Admin, get(portal)))
        .route("/onboarding", guarded(state, Page::Onboarding, get(onboarding)))
        .route(
            "/onboarding/step",
            guarded(state, Page::Onboarding, post(onboarding_step)),
        )
        .route(
            "/onboarding/submit",
            guarded(state, Page::Onboarding, post(onboarding_submit)),
        )
}

fn guarded(
    state: &Arc<AppState>,
    page: Page,
    handler: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    handler.route_layer(middleware::from_fn_with_state(
        (state.clone(), page),
        require_page,
    ))
}

// ─── Shared Views ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserSummary {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub roles: RoleCapabilitySet,
}

impl UserSummary {
    fn new(profile: &UserProfile, roles: RoleCapabilitySet) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name(),
            roles,
        }
    }
}

// ─── Dashboard ───────────────────────────────────────────────

/// What choosing a dashboard card does.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardAction {
    Navigate { path: String },
    /// Open onboarding, with the card's role preselected when it is one a
    /// user can pick.
    Onboarding { role: Option<RoleChoice> },
    /// Role is granted by staff; nothing to do from here.
    Unavailable,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoleCard {
    pub key: String,
    pub title: String,
    pub locked: bool,
    pub action: CardAction,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DashboardView {
    pub user: UserSummary,
    pub onboarding_required: bool,
    pub cards: Vec<RoleCard>,
}

/// The four role cards for `roles`.
pub fn role_cards(roles: &RoleCapabilitySet) -> Vec<RoleCard> {
    Page::PORTALS
        .into_iter()
        .map(|page| {
            let locked = roles.needs_setup || !page.allows(roles);
            let action = if !locked {
                CardAction::Navigate {
                    path: page.path().to_string(),
                }
            } else if roles.needs_setup {
                CardAction::Onboarding {
                    role: RoleChoice::for_portal(page),
                }
            } else {
                CardAction::Unavailable
            };
            RoleCard {
                key: page.path().trim_start_matches('/').to_string(),
                title: page.title().to_string(),
                locked,
                action,
            }
        })
        .collect()
}

async fn dashboard(Extension(view): Extension<GuardedView>) -> Json<DashboardView> {
    Json(DashboardView {
        user: UserSummary::new(&view.profile, view.roles),
        onboarding_required: view.onboarding_required(),
        cards: role_cards(&view.roles),
    })
}

// ─── Role Portals ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PortalView {
    pub title: String,
    pub path: String,
    pub user: UserSummary,
}

async fn portal(Extension(view): Extension<GuardedView>) -> Json<PortalView> {
    Json(PortalView {
        title: view.page.title().to_string(),
        path: view.page.path().to_string(),
        user: UserSummary::new(&view.profile, view.roles),
    })
}

// ─── Onboarding ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OnboardingParams {
    #[serde(default)]
    role: Option<RoleChoice>,
}

#[derive(Debug, Serialize)]
pub struct OnboardingView {
    /// False once the profile has a role; the wizard is then read-only.
    pub required: bool,
    pub wizard: OnboardingWizard,
    pub can_continue: bool,
}

async fn onboarding(
    Extension(view): Extension<GuardedView>,
    Query(params): Query<OnboardingParams>,
) -> Json<OnboardingView> {
    let wizard = params
        .role
        .map(OnboardingWizard::with_role)
        .unwrap_or_default();
    Json(OnboardingView {
        required: view.onboarding_required(),
        can_continue: wizard.can_continue(),
        wizard,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Next,
    Back,
    GoTo,
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub wizard: OnboardingWizard,
    pub action: StepAction,
    /// Target of `go_to`.
    #[serde(default)]
    pub step: Option<OnboardingStep>,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    /// The wizard after the move; unchanged (data included) when refused.
    pub wizard: OnboardingWizard,
    pub moved: bool,
    pub missing: Vec<&'static str>,
    pub can_continue: bool,
}

async fn onboarding_step(Json(body): Json<StepRequest>) -> Result<Json<StepResponse>> {
    let mut wizard = body.wizard;
    let before = wizard.step;

    let outcome = match body.action {
        StepAction::Next => wizard.advance().map(|_| ()),
        StepAction::Back => {
            wizard.back();
            Ok(())
        }
        StepAction::GoTo => {
            let target = body
                .step
                .ok_or_else(|| AppError::BadRequest("go_to needs a step".to_string()))?;
            wizard.go_to(target).map(|_| ())
        }
    };
    let missing = match outcome {
        Err(OnboardingError::Incomplete { missing, .. }) => missing,
        _ => Vec::new(),
    };

    Ok(Json(StepResponse {
        moved: wizard.step != before,
        can_continue: wizard.can_continue(),
        missing,
        wizard,
    }))
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub redirect: String,
    pub user: UserSummary,
}

async fn onboarding_submit(
    State(state): State<Arc<AppState>>,
    Extension(view): Extension<GuardedView>,
    Json(wizard): Json<OnboardingWizard>,
) -> Result<Json<SubmitResponse>> {
    if !view.onboarding_required() {
        return Err(OnboardingError::AlreadyOnboarded.into());
    }
    let role = wizard
        .form
        .role
        .ok_or_else(|| AppError::BadRequest("role is required".to_string()))?;

    let profile = state.onboarding.submit(&view.session, &wizard).await?;
    let roles = RoleCapabilitySet::from_flags(&profile.roles);

    Ok(Json(SubmitResponse {
        redirect: role.portal().path().to_string(),
        user: UserSummary::new(&profile, roles),
    }))
}
