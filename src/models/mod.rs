// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod profile;
pub mod roles;
pub mod session;

pub use profile::{ProfileRow, ProfileUpdate, RoleFlags, UserProfile};
pub use roles::{Role, RoleCapabilitySet};
pub use session::{AuthProvider, OAuthProvider, Session, SessionInfo, SignOutScope};
