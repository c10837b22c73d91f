//! Session management: sign-in, sign-out, and the active mailbox
//!
//! One user is signed in at a time. A [`UserSession`] owns the per-user
//! machinery (store, watcher registry, invalidation tracker, pending
//! executor) and at most one live [`MailboxHandle`]. The [`SessionManager`]
//! swaps whole sessions on sign-in/sign-out and tells observers when the
//! active user changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::EngineConfig;
use crate::error::{MailboxError, SessionError};
use crate::invalidation::{DataSource, InvalidationTracker};
use crate::mailbox::MailboxHandle;
use crate::models::{LabelId, LocalConversation, LocalLabelId, UserId};
use crate::pager::PageKey;
use crate::pending::{PendingExecutor, RemoteBackend};
use crate::storage::MailboxStore;
use crate::watch::WatcherRegistry;

/// Everything owned by one signed-in user
pub struct UserSession {
    user_id: UserId,
    store: Arc<dyn MailboxStore>,
    watchers: Arc<WatcherRegistry>,
    invalidation: Arc<InvalidationTracker>,
    executor: Arc<PendingExecutor>,
    page_size: usize,
    mailbox: Mutex<Option<Arc<MailboxHandle>>>,
}

impl UserSession {
    fn new(
        user_id: UserId,
        store: Arc<dyn MailboxStore>,
        backend: Arc<dyn RemoteBackend>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let executor = PendingExecutor::spawn(Arc::clone(&store), backend, config.retry.clone());
        // Actions left over from a previous run drain as soon as we're up
        executor.kick();

        Arc::new(Self {
            user_id,
            store,
            watchers: Arc::new(WatcherRegistry::new()),
            invalidation: Arc::new(InvalidationTracker::new()),
            executor,
            page_size: config.page_size,
            mailbox: Mutex::new(None),
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn store(&self) -> &Arc<dyn MailboxStore> {
        &self.store
    }

    pub fn watchers(&self) -> &Arc<WatcherRegistry> {
        &self.watchers
    }

    pub fn invalidation(&self) -> &Arc<InvalidationTracker> {
        &self.invalidation
    }

    pub fn executor(&self) -> &Arc<PendingExecutor> {
        &self.executor
    }

    /// Make `label` the active mailbox and return its handle
    ///
    /// Switching to the already-active label returns the existing handle
    /// unchanged. Otherwise the old handle is disconnected strictly before
    /// the new one exists, so no two live handles ever overlap.
    pub fn switch_mailbox(&self, label: &LabelId) -> Result<Arc<MailboxHandle>, MailboxError> {
        let local = self.resolve_label(label)?;
        let mut guard = self.mailbox.lock().unwrap();

        if let Some(current) = guard.as_ref()
            && current.label() == local
            && current.is_connected()
        {
            return Ok(Arc::clone(current));
        }

        if let Some(old) = guard.take() {
            old.disconnect();
        }

        log::info!("switching mailbox to label {}", label.as_str());
        let handle = Arc::new(MailboxHandle::new(
            local,
            label.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.watchers),
            Arc::clone(&self.invalidation),
            Arc::clone(&self.executor),
            self.page_size,
        ));
        *guard = Some(Arc::clone(&handle));
        drop(guard);

        // A switch is a natural moment to drain whatever is still queued
        self.executor.kick();
        Ok(handle)
    }

    /// Map a remote label to its local id, announcing newly allocated labels
    pub fn resolve_label(&self, label: &LabelId) -> Result<LocalLabelId, MailboxError> {
        if let Some(local) = self.store.find_label(label)? {
            return Ok(local);
        }
        let local = self.store.resolve_label(label)?;
        self.invalidation.notify(&[DataSource::Labels]);
        Ok(local)
    }

    /// The currently active mailbox handle, if any
    pub fn current_mailbox(&self) -> Option<Arc<MailboxHandle>> {
        self.mailbox.lock().unwrap().clone()
    }

    /// Serve a page request addressed to a specific label
    ///
    /// Requests for a label that is no longer the active mailbox are stale
    /// leftovers from before a switch; they get an empty page rather than
    /// rows from the wrong list.
    pub fn load_page(&self, key: &PageKey) -> Result<Vec<LocalConversation>, MailboxError> {
        let Some(mailbox) = self.current_mailbox() else {
            log::debug!("page request for {} with no active mailbox", key.label.as_str());
            return Ok(Vec::new());
        };
        if mailbox.remote_label() != &key.label {
            log::debug!(
                "dropping stale page request for {} (active: {})",
                key.label.as_str(),
                mailbox.remote_label().as_str()
            );
            return Ok(Vec::new());
        }
        mailbox.paginator()?.load(key.page)
    }

    fn teardown(&self) {
        if let Some(mailbox) = self.mailbox.lock().unwrap().take() {
            mailbox.disconnect();
        }
        self.executor.shutdown();
    }
}

/// Told when the signed-in user changes
pub trait SessionObserver: Send + Sync {
    fn on_session_changed(&self, user: Option<&UserId>);
}

/// Subscription to session changes; disconnect is idempotent
pub struct SessionObserverHandle {
    id: u64,
    manager: Arc<SessionManager>,
}

impl SessionObserverHandle {
    pub fn disconnect(&self) {
        self.manager.observers.write().unwrap().remove(&self.id);
    }
}

/// Owns the active session and swaps it on sign-in/sign-out
pub struct SessionManager {
    config: EngineConfig,
    current: RwLock<Option<Arc<UserSession>>>,
    observers: RwLock<HashMap<u64, Arc<dyn SessionObserver>>>,
    next_observer_id: AtomicU64,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            current: RwLock::new(None),
            observers: RwLock::new(HashMap::new()),
            next_observer_id: AtomicU64::new(0),
        })
    }

    /// Sign a user in, replacing any existing session
    ///
    /// The outgoing session is fully torn down (mailbox disconnected,
    /// executor stopped) before the new one is visible.
    pub fn sign_in(
        &self,
        user_id: UserId,
        store: Arc<dyn MailboxStore>,
        backend: Arc<dyn RemoteBackend>,
    ) -> Arc<UserSession> {
        let session = UserSession::new(user_id.clone(), store, backend, &self.config);

        let previous = {
            let mut current = self.current.write().unwrap();
            current.replace(Arc::clone(&session))
        };
        if let Some(previous) = previous {
            log::info!("replacing session for {}", previous.user_id().as_str());
            previous.teardown();
        }

        log::info!("signed in {}", user_id.as_str());
        self.notify_observers(Some(&user_id));
        session
    }

    /// Sign the current user out, if any
    pub fn sign_out(&self) {
        let previous = self.current.write().unwrap().take();
        let Some(previous) = previous else {
            return;
        };
        log::info!("signed out {}", previous.user_id().as_str());
        previous.teardown();
        self.notify_observers(None);
    }

    /// The active session, if a user is signed in
    pub fn current(&self) -> Option<Arc<UserSession>> {
        self.current.read().unwrap().clone()
    }

    /// The active session, or [`SessionError::NotSignedIn`]
    pub fn require_current(&self) -> Result<Arc<UserSession>, SessionError> {
        self.current().ok_or(SessionError::NotSignedIn)
    }

    /// Register an observer for sign-in/sign-out transitions
    pub fn observe(
        self: &Arc<Self>,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionObserverHandle {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().unwrap().insert(id, observer);
        SessionObserverHandle {
            id,
            manager: Arc::clone(self),
        }
    }

    fn notify_observers(&self, user: Option<&UserId>) {
        let snapshot: Vec<Arc<dyn SessionObserver>> = {
            let observers = self.observers.read().unwrap();
            observers.values().cloned().collect()
        };
        for observer in snapshot {
            observer.on_session_changed(user);
        }
    }
}
