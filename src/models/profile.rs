// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model for the profile table.
//!
//! Rows come back from PostgREST with every column nullable. They are read
//! into [`ProfileRow`] and validated into [`UserProfile`] at the boundary, so
//! role logic never sees a missing flag.

use crate::error::ProfileError;
use serde::{Deserialize, Serialize};

/// Raw profile row as stored in the profile table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub student_code: Option<String>,
    pub department: Option<String>,
    pub academic_degree: Option<String>,
    pub is_student: Option<bool>,
    pub is_advisor: Option<bool>,
    pub is_reviewer: Option<bool>,
    pub is_coordinator: Option<bool>,
    pub is_administrator: Option<bool>,
    pub profile_completed: Option<bool>,
}

/// The five independent role flags of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    pub is_student: bool,
    pub is_advisor: bool,
    pub is_reviewer: bool,
    pub is_coordinator: bool,
    pub is_administrator: bool,
}

impl RoleFlags {
    /// All flags false: the profile has never been assigned a role.
    pub fn is_unset(&self) -> bool {
        !(self.is_student
            || self.is_advisor
            || self.is_reviewer
            || self.is_coordinator
            || self.is_administrator)
    }
}

/// Validated user profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub program: Option<String>,
    pub student_code: Option<String>,
    pub department: Option<String>,
    pub academic_degree: Option<String>,
    pub roles: RoleFlags,
    pub profile_completed: bool,
}

impl UserProfile {
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }
}

/// Blank strings are stored by some legacy rows; treat them as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = ProfileError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let user_id = non_blank(row.id)
            .ok_or_else(|| ProfileError::Malformed("profile row without id".to_string()))?;

        Ok(UserProfile {
            user_id,
            email: non_blank(row.email),
            first_name: non_blank(row.first_name),
            last_name: non_blank(row.last_name),
            phone: non_blank(row.phone),
            program: non_blank(row.program),
            student_code: non_blank(row.student_code),
            department: non_blank(row.department),
            academic_degree: non_blank(row.academic_degree),
            roles: RoleFlags {
                is_student: row.is_student.unwrap_or(false),
                is_advisor: row.is_advisor.unwrap_or(false),
                is_reviewer: row.is_reviewer.unwrap_or(false),
                is_coordinator: row.is_coordinator.unwrap_or(false),
                is_administrator: row.is_administrator.unwrap_or(false),
            },
            profile_completed: row.profile_completed.unwrap_or(false),
        })
    }
}

/// Partial update written by onboarding. `None` columns are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_degree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_student: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_advisor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reviewer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_coordinator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_completed: Option<bool>,
}

impl ProfileUpdate {
    /// Apply this update to a stored row, as the profile table would.
    pub fn apply_to(&self, row: &mut ProfileRow) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }
        set(&mut row.first_name, &self.first_name);
        set(&mut row.last_name, &self.last_name);
        set(&mut row.phone, &self.phone);
        set(&mut row.program, &self.program);
        set(&mut row.student_code, &self.student_code);
        set(&mut row.department, &self.department);
        set(&mut row.academic_degree, &self.academic_degree);
        set(&mut row.is_student, &self.is_student);
        set(&mut row.is_advisor, &self.is_advisor);
        set(&mut row.is_reviewer, &self.is_reviewer);
        set(&mut row.is_coordinator, &self.is_coordinator);
        set(&mut row.profile_completed, &self.profile_completed);
    }
}
