// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Role Resolver: profile row lookup and capability derivation.

use crate::error::ProfileError;
use crate::models::{RoleCapabilitySet, Session, UserProfile};
use crate::store::SessionStore;

#[derive(Clone)]
pub struct RoleResolver {
    store: SessionStore,
}

impl RoleResolver {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Profile of the session's subject, read under the session's own JWT.
    ///
    /// A missing row is a provisioning defect (the signup trigger did not
    /// run) and is reported as `ProfileNotFound`, never retried.
    pub async fn load_profile(&self, session: &Session) -> Result<UserProfile, ProfileError> {
        let row = self
            .store
            .fetch_profile(&session.access_token, &session.user_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    subject = %session.user_id,
                    "Authenticated subject has no profile row"
                );
                ProfileError::ProfileNotFound(session.user_id.clone())
            })?;

        let profile = UserProfile::try_from(row)?;
        if profile.user_id != session.user_id {
            return Err(ProfileError::Malformed(format!(
                "profile row {} returned for subject {}",
                profile.user_id, session.user_id
            )));
        }
        Ok(profile)
    }

    pub async fn resolve_roles(&self, session: &Session) -> Result<RoleCapabilitySet, ProfileError> {
        let profile = self.load_profile(session).await?;
        Ok(RoleCapabilitySet::from_flags(&profile.roles))
    }
}
