// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session-change event bus.
//!
//! Events are published after the operation that caused them has completed
//! and its cookies have been written. Each subscriber sees events in
//! publish order. A subscriber that falls more than `EVENT_BUFFER` events
//! behind skips the oldest ones; handlers re-derive state from the session
//! carried by each event, so a skip never leaves them inconsistent.

use crate::models::{Session, SessionInfo};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// One session change for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user_id: String,
    /// The session after the change; `None` for sign-out.
    pub session: Option<SessionInfo>,
}

impl AuthEvent {
    pub fn for_session(kind: AuthEventKind, session: &Session) -> Self {
        Self {
            kind,
            user_id: session.user_id.clone(),
            session: Some(session.info()),
        }
    }

    pub fn signed_out(user_id: &str) -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            user_id: user_id.to_string(),
            session: None,
        }
    }
}

/// Process-wide publisher of [`AuthEvent`]s.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn publish(&self, event: AuthEvent) {
        let kind = event.kind;
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::debug!(?kind, receivers, "Published session event");
    }

    /// Raw receiver, for streaming consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Run `callback` for every future event until the returned handle is
    /// unsubscribed or dropped. Must be called inside a Tokio runtime.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let active = Arc::new(Mutex::new(true));
        let flag = active.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        // Held while the callback runs so unsubscribe waits for it.
                        let live = flag.lock().unwrap_or_else(|e| e.into_inner());
                        if !*live {
                            break;
                        }
                        callback(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session event subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription {
            active,
            task: Some(task),
        }
    }
}

/// Handle to an `on_change` listener.
///
/// Once `unsubscribe` returns (or the handle is dropped) the callback will
/// not run again.
pub struct Subscription {
    active: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop(&mut self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
