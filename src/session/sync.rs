use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::state::IdentityClass;

const CHANNEL_CAPACITY: usize = 16;

/// Cross-tab logout notification, stamped with the originating tab so a
/// tab can ignore its own publications.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutMessage {
    pub class: IdentityClass,
    pub source: Uuid,
}

/// Same-origin broadcast primitive (BroadcastChannel analogue). Tabs in
/// environments without it run on the storage-event fallback instead.
pub struct SessionHub {
    tx: broadcast::Sender<LogoutMessage>,
}

impl SessionHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn connect(&self) -> TabChannel {
        TabChannel {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TabChannel {
    tx: broadcast::Sender<LogoutMessage>,
    rx: broadcast::Receiver<LogoutMessage>,
}

impl TabChannel {
    pub fn publish(&self, msg: LogoutMessage) {
        // No receivers is fine: a single open tab still logs out.
        let _ = self.tx.send(msg);
    }

    pub fn try_recv(&mut self) -> Option<LogoutMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Mutation notification from the shared store, the fallback sync path.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    pub key: String,
    pub removed: bool,
    pub source: Uuid,
}

/// Same-origin key-value store shared by all tabs (localStorage
/// analogue). Writers are per-tab handles so mutation events carry their
/// origin, mirroring storage events not firing in the mutating tab.
#[derive(Clone)]
pub struct SharedStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl SharedStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn handle(&self, tab: Uuid) -> StorageHandle {
        StorageHandle {
            storage: self.clone(),
            tab,
        }
    }

    pub fn watch(&self) -> StorageWatcher {
        StorageWatcher {
            rx: self.events.subscribe(),
        }
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StorageHandle {
    storage: SharedStorage,
    tab: Uuid,
}

impl StorageHandle {
    pub fn get(&self, key: &str) -> Option<String> {
        self.storage.entries.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.storage
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        let _ = self.storage.events.send(StorageEvent {
            key: key.to_string(),
            removed: false,
            source: self.tab,
        });
    }

    pub fn remove(&self, key: &str) {
        let existed = self.storage.entries.lock().unwrap().remove(key).is_some();
        if existed {
            let _ = self.storage.events.send(StorageEvent {
                key: key.to_string(),
                removed: true,
                source: self.tab,
            });
        }
    }
}

pub struct StorageWatcher {
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageWatcher {
    pub fn try_recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_shared_between_handles() {
        let storage = SharedStorage::new();
        let a = storage.handle(Uuid::new_v4());
        let b = storage.handle(Uuid::new_v4());

        a.set("token", "jwt");
        assert_eq!(b.get("token").as_deref(), Some("jwt"));

        b.remove("token");
        assert_eq!(a.get("token"), None);
    }

    #[test]
    fn mutation_events_carry_their_origin() {
        let storage = SharedStorage::new();
        let tab = Uuid::new_v4();
        let handle = storage.handle(tab);
        let mut watcher = storage.watch();

        handle.set("token", "jwt");
        let event = watcher.try_recv().expect("set event");
        assert_eq!(event.key, "token");
        assert_eq!(event.source, tab);
        assert!(!event.removed);

        handle.remove("token");
        let event = watcher.try_recv().expect("remove event");
        assert!(event.removed);
    }

    #[test]
    fn removing_an_absent_key_emits_nothing() {
        let storage = SharedStorage::new();
        let handle = storage.handle(Uuid::new_v4());
        let mut watcher = storage.watch();

        handle.remove("token");
        assert!(watcher.try_recv().is_none());
    }

    #[test]
    fn hub_delivers_to_every_connected_tab() {
        let hub = SessionHub::new();
        let a = hub.connect();
        let mut b = hub.connect();

        let msg = LogoutMessage {
            class: IdentityClass::User,
            source: Uuid::new_v4(),
        };
        a.publish(msg.clone());
        assert_eq!(b.try_recv(), Some(msg));
        assert_eq!(b.try_recv(), None);
    }
}
