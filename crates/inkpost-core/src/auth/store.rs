use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::storage::{TokenStorage, TOKEN_STORAGE_KEY};

/// Handle returned by `AuthStore::subscribe`, used to unsubscribe.
pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&AuthState) + Send + Sync>;

/// Changes waiting to be delivered to subscribers.
#[derive(Default)]
struct Pending {
    queue: VecDeque<AuthState>,
    draining: bool,
}

/// Snapshot of the authentication state.
///
/// The authenticated flag is derived from the token, so a snapshot can never
/// hold one without the other.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    token: Option<String>,
}

impl AuthState {
    /// An empty token counts as no token.
    pub fn from_token(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("is_authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Holder of the current bearer token.
///
/// Changes reach observers two ways: callbacks registered with `subscribe`,
/// run synchronously in registration order, and `watch()` receivers for
/// async code. When built with a storage backend, the first callback writes
/// every change through to storage.
///
/// A change made while callbacks are running (for example by a callback
/// itself) is queued and delivered after the current round, so every
/// subscriber sees the changes in the order they happened and ends on the
/// latest state.
pub struct AuthStore {
    state: watch::Sender<AuthState>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    persistent: bool,
}

impl AuthStore {
    /// A store that starts logged out and persists nothing
    pub fn in_memory() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state,
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(Pending::default()),
            next_id: AtomicU64::new(0),
            persistent: false,
        }
    }

    /// Build the store, restoring the token from `storage` when a usable
    /// backend is given. Without one the store is memory-only.
    pub fn init(storage: Option<Arc<dyn TokenStorage>>) -> Self {
        let storage = match storage {
            Some(storage) if storage.is_available() => storage,
            Some(_) => {
                warn!("Token storage unavailable, keeping login in memory only");
                return Self::in_memory();
            }
            None => {
                debug!("No token storage configured");
                return Self::in_memory();
            }
        };

        let initial = match storage.get(TOKEN_STORAGE_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                None
            }
        };

        let mut store = Self::in_memory();
        store.state.send_replace(AuthState::from_token(initial));
        store.persistent = true;
        store.register(persist_to(storage));
        debug!(authenticated = store.is_authenticated(), "Auth store initialized");
        store
    }

    /// Whether changes are written through to a storage backend
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Replace the token. Subscribers run only if the value changed.
    pub fn set_token(&self, token: Option<String>) {
        let next = AuthState::from_token(token);
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });

        if changed {
            debug!(authenticated = next.is_authenticated(), "Auth token changed");
            self.notify(&next);
        }
    }

    pub fn logout(&self) {
        self.set_token(None);
    }

    /// Register `callback`. It runs once right away with the current state,
    /// then after every change.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let callback: Subscriber = Arc::new(callback);
        let id = self.register(Arc::clone(&callback));
        callback(&self.state());
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Receiver for async observers; always holds the latest state.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn register(&self, callback: Subscriber) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push((id, callback));
        id
    }

    fn notify(&self, state: &AuthState) {
        {
            let mut pending = self.pending();
            pending.queue.push_back(state.clone());
            if pending.draining {
                // Whoever is draining delivers it after the current round
                return;
            }
            pending.draining = true;
        }

        loop {
            let next = {
                let mut pending = self.pending();
                match pending.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        pending.draining = false;
                        return;
                    }
                }
            };

            // Snapshot so callbacks may subscribe or change the token themselves
            let subscribers: Vec<Subscriber> = self
                .subscribers()
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();
            for callback in subscribers {
                callback(&next);
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write-through callback: store the token, or drop the key once cleared.
/// Failures are logged and otherwise ignored.
fn persist_to(storage: Arc<dyn TokenStorage>) -> Subscriber {
    Arc::new(move |state: &AuthState| {
        let result = match state.token() {
            Some(token) => storage.set(TOKEN_STORAGE_KEY, token),
            None => storage.remove(TOKEN_STORAGE_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist auth token");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;

    struct UnavailableStorage;

    impl TokenStorage for UnavailableStorage {
        fn is_available(&self) -> bool {
            false
        }
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            panic!("unavailable storage must not be read");
        }
        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            panic!("unavailable storage must not be written");
        }
        fn remove(&self, _key: &str) -> anyhow::Result<()> {
            panic!("unavailable storage must not be written");
        }
    }

    struct BrokenStorage;

    impl TokenStorage for BrokenStorage {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("disk on fire"))
        }
        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk on fire"))
        }
        fn remove(&self, _key: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk on fire"))
        }
    }

    fn shared_storage() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new())
    }

    #[test]
    fn test_flag_tracks_every_assignment() {
        let store = AuthStore::in_memory();
        let sequence = [
            Some("a"),
            None,
            Some("b"),
            Some("b"),
            Some("c"),
            None,
            None,
            Some(""),
        ];
        for token in sequence {
            store.set_token(token.map(str::to_string));
            let expected = token.filter(|t| !t.is_empty());
            assert_eq!(store.token().as_deref(), expected);
            assert_eq!(store.is_authenticated(), expected.is_some());
        }
    }

    #[test]
    fn test_token_survives_reinitialization() {
        let storage = shared_storage();
        let store = AuthStore::init(Some(storage.clone()));
        assert!(store.is_persistent());
        assert!(!store.is_authenticated());

        store.set_token(Some("jwt-1".to_string()));
        drop(store);

        let reloaded = AuthStore::init(Some(storage.clone()));
        assert_eq!(reloaded.token().as_deref(), Some("jwt-1"));
        assert!(reloaded.is_authenticated());
    }

    #[test]
    fn test_logout_clears_persisted_token() {
        let storage = shared_storage();
        let store = AuthStore::init(Some(storage.clone()));
        store.set_token(Some("jwt-1".to_string()));
        store.logout();

        assert_eq!(storage.get(TOKEN_STORAGE_KEY).unwrap(), None);
        let reloaded = AuthStore::init(Some(storage));
        assert_eq!(reloaded.token(), None);
        assert!(!reloaded.is_authenticated());
    }

    #[test]
    fn test_no_storage_starts_logged_out() {
        let store = AuthStore::init(None);
        assert!(!store.is_persistent());
        assert!(!store.is_authenticated());
        store.set_token(Some("t".to_string()));
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_unavailable_storage_falls_back_to_memory() {
        let store = AuthStore::init(Some(Arc::new(UnavailableStorage)));
        assert!(!store.is_persistent());
        store.set_token(Some("t".to_string()));
        store.logout();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_storage_failures_are_best_effort() {
        let store = AuthStore::init(Some(Arc::new(BrokenStorage)));
        assert!(!store.is_authenticated());
        store.set_token(Some("t".to_string()));
        assert_eq!(store.token().as_deref(), Some("t"));
        store.logout();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let store = AuthStore::in_memory();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            store.subscribe(move |state| {
                log.lock()
                    .unwrap()
                    .push(format!("{}:{}", name, state.is_authenticated()));
            });
        }
        log.lock().unwrap().clear();

        store.set_token(Some("t".to_string()));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:true", "second:true", "third:true"]
        );
    }

    #[test]
    fn test_subscribe_sees_current_state_immediately() {
        let store = AuthStore::in_memory();
        store.set_token(Some("t".to_string()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].token(), Some("t"));
    }

    #[test]
    fn test_unchanged_token_does_not_notify() {
        let store = AuthStore::in_memory();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_token(Some("t".to_string()));
        store.set_token(Some("t".to_string()));
        store.logout();
        store.logout();
        // Initial call plus two real changes
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = AuthStore::in_memory();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set_token(Some("t".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_state_is_consistent() {
        let store = AuthStore::in_memory();
        store.subscribe(|state| {
            assert_eq!(state.is_authenticated(), state.token().is_some());
        });
        store.set_token(Some("a".to_string()));
        store.set_token(Some(String::new()));
        store.set_token(Some("b".to_string()));
    }

    #[test]
    fn test_change_made_inside_callback_is_delivered_last() {
        let store = Arc::new(AuthStore::in_memory());

        let rejecting = Arc::downgrade(&store);
        store.subscribe(move |state| {
            if state.token() == Some("bad") {
                if let Some(store) = rejecting.upgrade() {
                    store.logout();
                }
            }
        });

        let history = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&history);
        store.subscribe(move |state| {
            sink.lock().unwrap().push(state.token().map(str::to_string));
        });

        store.set_token(Some("bad".to_string()));

        assert_eq!(store.token(), None);
        assert_eq!(
            *history.lock().unwrap(),
            vec![None, Some("bad".to_string()), None]
        );
    }

    #[test]
    fn test_nested_changes_keep_watch_and_callbacks_in_agreement() {
        let store = Arc::new(AuthStore::in_memory());
        let rx = store.watch();

        let refreshing = Arc::downgrade(&store);
        store.subscribe(move |state| {
            if state.token() == Some("short-lived") {
                if let Some(store) = refreshing.upgrade() {
                    store.set_token(Some("refreshed".to_string()));
                }
            }
        });

        let last_seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_seen);
        store.subscribe(move |state| {
            *sink.lock().unwrap() = state.token().map(str::to_string);
        });

        store.set_token(Some("short-lived".to_string()));

        assert_eq!(store.token().as_deref(), Some("refreshed"));
        assert_eq!(rx.borrow().token(), Some("refreshed"));
        assert_eq!(last_seen.lock().unwrap().as_deref(), Some("refreshed"));
    }

    #[test]
    fn test_watch_receiver_sees_latest_state() {
        let store = AuthStore::in_memory();
        let mut rx = store.watch();
        assert!(!rx.borrow().is_authenticated());

        store.set_token(Some("t".to_string()));
        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.token(), Some("t"));
        assert!(state.is_authenticated());
    }

    #[test]
    fn test_debug_redacts_token() {
        let state = AuthState::from_token(Some("secret.jwt.value".to_string()));
        let printed = format!("{:?}", state);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("is_authenticated: true"));
    }
}
