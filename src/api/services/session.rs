//! Sign-in state for one editor session.

use crate::storage::{Capability, UserSession};
use parking_lot::RwLock;
use tracing::info;

/// Holds the current [`Capability`]. Constructed once per editor session and
/// shared by reference with every component that needs it.
#[derive(Default)]
pub struct AuthSession {
    capability: RwLock<Capability>,
}

impl AuthSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(session: UserSession) -> Self {
        Self {
            capability: RwLock::new(Capability::Authenticated(session)),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.capability.read().is_authenticated()
    }

    pub fn sign_in(&self, session: UserSession) {
        info!("[Auth] Signed in as {}", session.user.email);
        *self.capability.write() = Capability::Authenticated(session);
    }

    pub fn sign_out(&self) {
        info!("[Auth] Signed out");
        *self.capability.write() = Capability::Anonymous;
    }
}
