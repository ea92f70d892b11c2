use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two independent session classes a client can hold at once. Each
/// owns its own storage keys so an admin login never disturbs a user
/// session in the same browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClass {
    User,
    Admin,
}

impl IdentityClass {
    pub fn token_key(self) -> &'static str {
        match self {
            IdentityClass::User => "token",
            IdentityClass::Admin => "admin-token",
        }
    }

    pub fn identity_key(self) -> &'static str {
        match self {
            IdentityClass::User => "user",
            IdentityClass::Admin => "admin",
        }
    }
}

/// Cached projection of the signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<String>,
    pub identity: Option<SessionIdentity>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RequestStarted,
    LoginSucceeded {
        token: String,
        identity: SessionIdentity,
    },
    IdentityRefreshed {
        identity: SessionIdentity,
    },
    RequestFailed {
        message: String,
    },
    ErrorCleared,
    /// User-initiated logout in this tab.
    Logout,
    /// Logout observed from another tab; mutates local state only and
    /// must never be re-broadcast.
    SyncLogout,
}

/// Pure transition function; all side effects live in the manager.
pub fn apply(state: &SessionState, event: &SessionEvent) -> SessionState {
    match event {
        SessionEvent::RequestStarted => SessionState {
            loading: true,
            error: None,
            ..state.clone()
        },
        SessionEvent::LoginSucceeded { token, identity } => SessionState {
            token: Some(token.clone()),
            identity: Some(identity.clone()),
            loading: false,
            error: None,
        },
        SessionEvent::IdentityRefreshed { identity } => SessionState {
            identity: Some(identity.clone()),
            loading: false,
            ..state.clone()
        },
        SessionEvent::RequestFailed { message } => SessionState {
            loading: false,
            error: Some(message.clone()),
            ..state.clone()
        },
        SessionEvent::ErrorCleared => SessionState {
            error: None,
            ..state.clone()
        },
        // Both logout variants reach the same terminal state.
        SessionEvent::Logout | SessionEvent::SyncLogout => SessionState::default(),
    }
}
