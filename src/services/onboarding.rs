// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Onboarding wizard for profiles without a role.
//!
//! Three steps: role, personal data, affiliation. A step unlocks only when
//! every required field of the previous step is non-blank after trimming.
//! The final submit writes fields, role flags and `profile_completed` in a
//! single profile update.

use super::guard::Page;
use crate::error::{AppError, ProfileError};
use crate::models::{ProfileUpdate, RoleFlags, Session, UserProfile};
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Role a user may pick for themselves. Reviewer and administrator are
/// granted by staff only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum RoleChoice {
    #[serde(rename = "tesista", alias = "student")]
    Student,
    #[serde(rename = "docente", alias = "advisor")]
    Docente,
    #[serde(rename = "coordinador", alias = "coordinator")]
    Coordinator,
}

impl RoleChoice {
    /// Flags written for this choice. Docente covers both advising and
    /// reviewing.
    pub fn flags(self) -> RoleFlags {
        match self {
            RoleChoice::Student => RoleFlags {
                is_student: true,
                ..Default::default()
            },
            RoleChoice::Docente => RoleFlags {
                is_advisor: true,
                is_reviewer: true,
                ..Default::default()
            },
            RoleChoice::Coordinator => RoleFlags {
                is_coordinator: true,
                ..Default::default()
            },
        }
    }

    /// Portal opened after onboarding completes.
    pub fn portal(self) -> Page {
        match self {
            RoleChoice::Student => Page::Tesista,
            RoleChoice::Docente => Page::Docente,
            RoleChoice::Coordinator => Page::Coordinador,
        }
    }

    /// Preselection offered by a locked dashboard card.
    pub fn for_portal(page: Page) -> Option<Self> {
        match page {
            Page::Tesista => Some(RoleChoice::Student),
            Page::Docente => Some(RoleChoice::Docente),
            Page::Coordinador => Some(RoleChoice::Coordinator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    RoleSelection,
    PersonalData,
    Affiliation,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 3] = [
        OnboardingStep::RoleSelection,
        OnboardingStep::PersonalData,
        OnboardingStep::Affiliation,
    ];

    pub fn number(self) -> u8 {
        match self {
            OnboardingStep::RoleSelection => 1,
            OnboardingStep::PersonalData => 2,
            OnboardingStep::Affiliation => 3,
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            OnboardingStep::RoleSelection => Some(OnboardingStep::PersonalData),
            OnboardingStep::PersonalData => Some(OnboardingStep::Affiliation),
            OnboardingStep::Affiliation => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            OnboardingStep::RoleSelection => None,
            OnboardingStep::PersonalData => Some(OnboardingStep::RoleSelection),
            OnboardingStep::Affiliation => Some(OnboardingStep::PersonalData),
        }
    }
}

/// Data entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingForm {
    pub role: Option<RoleChoice>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub program: String,
    pub student_code: String,
    pub department: String,
    pub academic_degree: String,
}

impl OnboardingForm {
    /// Required fields of `step` that are blank.
    pub fn missing_fields(&self, step: OnboardingStep) -> Vec<&'static str> {
        let required: Vec<(&'static str, &str)> = match step {
            OnboardingStep::RoleSelection => {
                return if self.role.is_none() {
                    vec!["role"]
                } else {
                    Vec::new()
                };
            }
            OnboardingStep::PersonalData => vec![
                ("first_name", self.first_name.as_str()),
                ("last_name", self.last_name.as_str()),
            ],
            OnboardingStep::Affiliation => match self.role {
                Some(RoleChoice::Student) => vec![
                    ("program", self.program.as_str()),
                    ("student_code", self.student_code.as_str()),
                ],
                Some(RoleChoice::Docente) => vec![
                    ("department", self.department.as_str()),
                    ("academic_degree", self.academic_degree.as_str()),
                ],
                Some(RoleChoice::Coordinator) => vec![
                    ("department", self.department.as_str()),
                    ("program", self.program.as_str()),
                ],
                None => return vec!["role"],
            },
        };

        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Step {} is incomplete: missing {}", .step.number(), .missing.join(", "))]
    Incomplete {
        step: OnboardingStep,
        missing: Vec<&'static str>,
    },

    #[error("Profile already has a role")]
    AlreadyOnboarded,

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl From<OnboardingError> for AppError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::Profile(e) => e.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Wizard position plus entered data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingWizard {
    pub step: OnboardingStep,
    pub form: OnboardingForm,
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wizard with a role already picked, as from a locked dashboard card.
    pub fn with_role(role: RoleChoice) -> Self {
        Self {
            step: OnboardingStep::RoleSelection,
            form: OnboardingForm {
                role: Some(role),
                ..Default::default()
            },
        }
    }

    pub fn can_continue(&self) -> bool {
        self.form.missing_fields(self.step).is_empty()
    }

    /// Move forward one step. The last step stays put.
    pub fn advance(&mut self) -> Result<OnboardingStep, OnboardingError> {
        self.check(self.step)?;
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Move back one step. Entered data is kept.
    pub fn back(&mut self) -> OnboardingStep {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        self.step
    }

    /// Jump to `target`; every earlier step must be complete.
    pub fn go_to(&mut self, target: OnboardingStep) -> Result<OnboardingStep, OnboardingError> {
        for step in OnboardingStep::ALL.into_iter().filter(|s| *s < target) {
            self.check(step)?;
        }
        self.step = target;
        Ok(self.step)
    }

    fn check(&self, step: OnboardingStep) -> Result<(), OnboardingError> {
        let missing = self.form.missing_fields(step);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OnboardingError::Incomplete { step, missing })
        }
    }

    /// Profile update for a fully completed wizard.
    pub fn build_update(&self) -> Result<ProfileUpdate, OnboardingError> {
        for step in OnboardingStep::ALL {
            self.check(step)?;
        }
        let role = self.form.role.ok_or(OnboardingError::Incomplete {
            step: OnboardingStep::RoleSelection,
            missing: vec!["role"],
        })?;
        let flags = role.flags();
        let form = &self.form;

        let mut update = ProfileUpdate {
            first_name: trimmed(&form.first_name),
            last_name: trimmed(&form.last_name),
            phone: trimmed(&form.phone),
            is_student: Some(flags.is_student),
            is_advisor: Some(flags.is_advisor),
            is_reviewer: Some(flags.is_reviewer),
            is_coordinator: Some(flags.is_coordinator),
            profile_completed: Some(true),
            ..Default::default()
        };
        match role {
            RoleChoice::Student => {
                update.program = trimmed(&form.program);
                update.student_code = trimmed(&form.student_code);
            }
            RoleChoice::Docente => {
                update.department = trimmed(&form.department);
                update.academic_degree = trimmed(&form.academic_degree);
            }
            RoleChoice::Coordinator => {
                update.department = trimmed(&form.department);
                update.program = trimmed(&form.program);
            }
        }
        Ok(update)
    }
}

/// Persists a completed wizard.
#[derive(Clone)]
pub struct OnboardingService {
    store: SessionStore,
}

impl OnboardingService {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Write the wizard's profile update for `session`'s subject.
    ///
    /// The wizard is only borrowed; on failure the caller still holds every
    /// entered value.
    pub async fn submit(
        &self,
        session: &Session,
        wizard: &OnboardingWizard,
    ) -> Result<UserProfile, OnboardingError> {
        let update = wizard.build_update()?;

        let row = self
            .store
            .update_profile(&session.access_token, &session.user_id, &update)
            .await
            .inspect_err(|e| {
                tracing::warn!(subject = %session.user_id, error = %e, "Onboarding submit failed")
            })?;

        let profile = UserProfile::try_from(row)?;
        tracing::info!(subject = %session.user_id, role = ?wizard.form.role, "Onboarding completed");
        Ok(profile)
    }
}
