use tracing::debug;
use uuid::Uuid;

use super::state::{apply, IdentityClass, SessionEvent, SessionState};
use super::sync::{LogoutMessage, SessionHub, SharedStorage, StorageHandle, StorageWatcher, TabChannel};

/// Drives one identity class's session inside one "tab": applies pure
/// transitions, persists through the storage port, and keeps sibling
/// tabs converged on logout through the broadcast port (or the storage
/// events when no hub is available).
pub struct SessionManager {
    class: IdentityClass,
    tab: Uuid,
    state: SessionState,
    storage: StorageHandle,
    watcher: StorageWatcher,
    channel: Option<TabChannel>,
}

impl SessionManager {
    pub fn new(class: IdentityClass, storage: &SharedStorage, hub: Option<&SessionHub>) -> Self {
        let tab = Uuid::new_v4();
        let handle = storage.handle(tab);
        let state = Self::restore(class, &handle);
        Self {
            class,
            tab,
            state,
            storage: handle,
            watcher: storage.watch(),
            channel: hub.map(SessionHub::connect),
        }
    }

    /// Hydrate from persisted keys, like a fresh tab reading storage.
    fn restore(class: IdentityClass, storage: &StorageHandle) -> SessionState {
        let token = storage.get(class.token_key());
        let identity = storage
            .get(class.identity_key())
            .and_then(|raw| serde_json::from_str(&raw).ok());
        SessionState {
            token,
            identity,
            loading: false,
            error: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn dispatch(&mut self, event: SessionEvent) {
        self.state = apply(&self.state, &event);

        match &event {
            SessionEvent::LoginSucceeded { token, identity } => {
                self.storage.set(self.class.token_key(), token);
                if let Ok(raw) = serde_json::to_string(identity) {
                    self.storage.set(self.class.identity_key(), &raw);
                }
            }
            SessionEvent::IdentityRefreshed { identity } => {
                if let Ok(raw) = serde_json::to_string(identity) {
                    self.storage.set(self.class.identity_key(), &raw);
                }
            }
            SessionEvent::Logout => {
                self.storage.remove(self.class.token_key());
                self.storage.remove(self.class.identity_key());
                if let Some(channel) = &self.channel {
                    channel.publish(LogoutMessage {
                        class: self.class,
                        source: self.tab,
                    });
                }
            }
            // Local mutation only; the originating tab already cleared
            // storage, and re-publishing would loop forever.
            SessionEvent::SyncLogout => {}
            _ => {}
        }
    }

    pub fn logout(&mut self) {
        self.dispatch(SessionEvent::Logout);
    }

    /// Deleted-account heuristic: a protected call answered with 404
    /// while a token is held means the account is gone. The session is
    /// discarded and the caller must redirect to the login page; any
    /// other failure becomes a transient error.
    pub fn handle_protected_failure(&mut self, status: u16, message: &str) -> bool {
        if status == 404 && self.state.is_authenticated() {
            debug!(class = ?self.class, "account missing, forcing logout");
            self.dispatch(SessionEvent::Logout);
            return true;
        }
        self.dispatch(SessionEvent::RequestFailed {
            message: message.to_string(),
        });
        false
    }

    /// One propagation cycle: drain the broadcast channel, then the
    /// storage events. Both converge on the same sync transition.
    pub fn pump(&mut self) {
        let mut synced = false;

        if let Some(channel) = &mut self.channel {
            while let Some(msg) = channel.try_recv() {
                if msg.source != self.tab && msg.class == self.class {
                    synced = true;
                }
            }
        }

        while let Some(event) = self.watcher.try_recv() {
            if event.source != self.tab && event.removed && event.key == self.class.token_key() {
                synced = true;
            }
        }

        if synced {
            self.dispatch(SessionEvent::SyncLogout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::SessionIdentity;

    fn identity(is_admin: bool) -> SessionIdentity {
        SessionIdentity {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@x.com".into(),
            is_admin,
            profile_image: None,
        }
    }

    fn login(manager: &mut SessionManager, token: &str, is_admin: bool) {
        manager.dispatch(SessionEvent::LoginSucceeded {
            token: token.into(),
            identity: identity(is_admin),
        });
    }

    #[test]
    fn logout_in_one_tab_reaches_the_other_within_one_pump() {
        let storage = SharedStorage::new();
        let hub = SessionHub::new();
        let mut tab_a = SessionManager::new(IdentityClass::User, &storage, Some(&hub));
        let mut tab_b = SessionManager::new(IdentityClass::User, &storage, Some(&hub));

        login(&mut tab_a, "jwt", false);
        tab_b.pump();
        // Tab B picks the login up on its next hydration in a browser;
        // here we only care that logout converges.
        login(&mut tab_b, "jwt", false);

        tab_a.logout();
        assert!(!tab_a.state().is_authenticated());

        tab_b.pump();
        assert!(!tab_b.state().is_authenticated());
        assert!(tab_b.state().identity.is_none());
    }

    #[test]
    fn receiving_tab_does_not_rebroadcast() {
        let storage = SharedStorage::new();
        let hub = SessionHub::new();
        let mut tab_a = SessionManager::new(IdentityClass::User, &storage, Some(&hub));
        let mut tab_b = SessionManager::new(IdentityClass::User, &storage, Some(&hub));
        let mut probe = hub.connect();

        login(&mut tab_a, "jwt", false);
        login(&mut tab_b, "jwt", false);

        tab_a.logout();
        tab_b.pump();
        tab_b.pump();

        // Exactly one message ever crossed the channel.
        assert!(probe.try_recv().is_some());
        assert!(probe.try_recv().is_none());
    }

    #[test]
    fn storage_fallback_syncs_tabs_without_a_hub() {
        let storage = SharedStorage::new();
        let hub = SessionHub::new();
        let mut tab_a = SessionManager::new(IdentityClass::User, &storage, Some(&hub));
        // Tab B's environment lacks the broadcast primitive.
        let mut tab_b = SessionManager::new(IdentityClass::User, &storage, None);

        login(&mut tab_a, "jwt", false);
        login(&mut tab_b, "jwt", false);

        tab_a.logout();
        tab_b.pump();
        assert!(!tab_b.state().is_authenticated());
    }

    #[test]
    fn user_and_admin_sessions_are_independent() {
        let storage = SharedStorage::new();
        let hub = SessionHub::new();
        let mut user_tab = SessionManager::new(IdentityClass::User, &storage, Some(&hub));
        let mut admin_tab = SessionManager::new(IdentityClass::Admin, &storage, Some(&hub));

        login(&mut user_tab, "user-jwt", false);
        login(&mut admin_tab, "admin-jwt", true);

        admin_tab.logout();
        user_tab.pump();

        assert!(user_tab.state().is_authenticated());
        assert!(!admin_tab.state().is_authenticated());
    }

    #[test]
    fn forced_logout_on_deleted_account() {
        let storage = SharedStorage::new();
        let mut manager = SessionManager::new(IdentityClass::User, &storage, None);
        login(&mut manager, "jwt", false);

        // Still-valid token replayed after the account was deleted.
        let must_redirect = manager.handle_protected_failure(404, "User missing");
        assert!(must_redirect);
        assert!(!manager.state().is_authenticated());
        assert_eq!(manager.storage.get("token"), None);
    }

    #[test]
    fn other_failures_stay_transient() {
        let storage = SharedStorage::new();
        let mut manager = SessionManager::new(IdentityClass::User, &storage, None);
        login(&mut manager, "jwt", false);

        let must_redirect = manager.handle_protected_failure(500, "Internal server error");
        assert!(!must_redirect);
        assert!(manager.state().is_authenticated());
        assert_eq!(
            manager.state().error.as_deref(),
            Some("Internal server error")
        );
    }

    #[test]
    fn fresh_tab_restores_a_persisted_session() {
        let storage = SharedStorage::new();
        let mut first = SessionManager::new(IdentityClass::User, &storage, None);
        login(&mut first, "jwt", false);

        let second = SessionManager::new(IdentityClass::User, &storage, None);
        assert!(second.state().is_authenticated());
        assert_eq!(
            second.state().identity.as_ref().map(|i| i.email.as_str()),
            Some("ada@x.com")
        );
    }
}
