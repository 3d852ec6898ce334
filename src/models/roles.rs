// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roles and the capability set derived from profile flags.

use crate::models::profile::RoleFlags;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A portal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Tesista
    Student,
    /// Asesor
    Advisor,
    /// Revisor
    Reviewer,
    /// Coordinador
    Coordinator,
    Administrator,
}

/// Capabilities of one profile at read time. Never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoleCapabilitySet {
    pub student: bool,
    pub advisor: bool,
    pub reviewer: bool,
    pub coordinator: bool,
    pub administrator: bool,
    /// No role at all; the user must go through onboarding first.
    pub needs_setup: bool,
}

impl RoleCapabilitySet {
    pub fn from_flags(flags: &RoleFlags) -> Self {
        Self {
            student: flags.is_student,
            advisor: flags.is_advisor,
            reviewer: flags.is_reviewer,
            coordinator: flags.is_coordinator,
            administrator: flags.is_administrator,
            needs_setup: flags.is_unset(),
        }
    }

    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Student => self.student,
            Role::Advisor => self.advisor,
            Role::Reviewer => self.reviewer,
            Role::Coordinator => self.coordinator,
            Role::Administrator => self.administrator,
        }
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has(*role))
    }
}
