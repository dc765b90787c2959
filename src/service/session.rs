//! Who is practicing: a guest or a signed-in user.

use serde::{Deserialize, Serialize};

/// Account as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub coins: u32,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl User {
    /// Placeholder account of guest sessions.
    pub fn guest() -> Self {
        User {
            id: 0,
            email: "guest@localhost".to_string(),
            username: "Guest User".to_string(),
            coins: 0,
            current_streak: 0,
            longest_streak: 0,
            language: default_language(),
        }
    }
}

/// Explicit session state handed to services and the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionContext {
    Guest { user: User },
    Authenticated { token: String, user: User },
}

impl SessionContext {
    pub fn guest() -> Self {
        SessionContext::Guest { user: User::guest() }
    }

    pub fn authenticated(token: impl Into<String>, user: User) -> Self {
        SessionContext::Authenticated {
            token: token.into(),
            user,
        }
    }

    /// End the session. Nothing outlives it.
    pub fn logout(self) {
        tracing::debug!(user = %self.user().username, "session ended");
    }

    /// Guests are scored locally.
    pub fn is_guest(&self) -> bool {
        matches!(self, SessionContext::Guest { .. })
    }

    pub fn user(&self) -> &User {
        match self {
            SessionContext::Guest { user } | SessionContext::Authenticated { user, .. } => user,
        }
    }

    /// Bearer token for authenticated requests.
    pub fn token(&self) -> Option<&str> {
        match self {
            SessionContext::Guest { .. } => None,
            SessionContext::Authenticated { token, .. } => Some(token),
        }
    }
}
