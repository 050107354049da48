//! Member session
//!
//! Explicit holder of the bearer credential supplied by the identity
//! collaborator. Passed by `Arc` to the rail client; nothing reads
//! credentials from ambient global state.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Clone)]
struct SessionState {
    bearer_token: String,
    tenant_id: Option<String>,
    started_at: DateTime<Utc>,
}

/// Session lifecycle: `init` → (calls) → `clear`
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<Option<SessionState>>,
}

impl Session {
    /// Create an empty (signed-out) session
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) the session with a credential
    pub fn init(&self, bearer_token: impl Into<String>, tenant_id: Option<String>) {
        let state = SessionState {
            bearer_token: bearer_token.into(),
            tenant_id,
            started_at: Utc::now(),
        };
        info!(tenant = ?state.tenant_id, "Session initialized");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// End the session. Returns `false` if it was already clear.
    pub fn clear(&self) -> bool {
        let previous = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Session cleared");
        }
        previous.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.read(|s| s.is_some())
    }

    pub fn bearer(&self) -> Option<String> {
        self.read(|s| s.as_ref().map(|st| st.bearer_token.clone()))
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.read(|s| s.as_ref().and_then(|st| st.tenant_id.clone()))
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.as_ref().map(|st| st.started_at))
    }

    fn read<T>(&self, f: impl FnOnce(&Option<SessionState>) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }
}
