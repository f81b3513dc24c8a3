//! Auth state broadcasting
//!
//! Mirrors the identity provider's session into process-wide state and
//! republishes every change to registered listeners.
//!
//! Listeners registered before the first session value is known are held
//! until `initialize` (or the first `publish`) and then fire once with that
//! value. Listeners registered afterwards fire immediately with the current
//! snapshot. Callbacks always run outside the registry lock, so a callback
//! may subscribe or unsubscribe without deadlocking. A callback must not
//! publish: deliveries to one listener are serialized.
//!
//! Every session value carries a generation number. A listener never sees an
//! older generation after a newer one: when a registration snapshot races a
//! `publish` on another thread, whichever value is older is dropped for that
//! listener instead of being delivered out of order.

use crate::error::Result;
use crate::types::Session;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Listener invoked with the new session, or `None` on logout
pub type SessionCallback = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Session the provider currently holds, if any
    async fn current_session(&self) -> Result<Option<Session>>;

    /// End the provider-side session
    async fn sign_out(&self) -> Result<()>;
}

struct Listener {
    callback: SessionCallback,
    /// Highest generation handed to the callback so far; held while it runs
    delivered: Mutex<u64>,
}

impl Listener {
    fn new(callback: SessionCallback) -> Self {
        Self {
            callback,
            delivered: Mutex::new(0),
        }
    }

    /// Invoke the callback unless a newer generation already went out
    fn deliver(&self, generation: u64, session: Option<&Session>) -> bool {
        let mut delivered = self
            .delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *delivered >= generation {
            return false;
        }
        *delivered = generation;
        (self.callback)(session);
        true
    }
}

#[derive(Default)]
struct Registry {
    /// Zero until the first session value arrives
    generation: u64,
    session: Option<Session>,
    listeners: BTreeMap<u64, Arc<Listener>>,
    next_id: u64,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`AuthBroadcaster::subscribe`]
///
/// Dropping the handle keeps the listener registered; call `unsubscribe`.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if lock(&registry).listeners.remove(&self.id).is_some() {
                debug!("Auth listener {} unsubscribed", self.id);
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("generation", &self.generation)
            .field("session", &self.session)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Session-change broadcaster
///
/// Cheap to clone; clones share one registry and one session value.
#[derive(Debug, Clone, Default)]
pub struct AuthBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl AuthBroadcaster {
    /// Create an uninitialized broadcaster
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let listener = Arc::new(Listener::new(Arc::new(callback)));

        let (id, generation, snapshot) = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, listener.clone());
            (id, registry.generation, registry.session.clone())
        };

        if generation == 0 {
            debug!("Auth listener {} queued until initialization", id);
        } else if listener.deliver(generation, snapshot.as_ref()) {
            debug!("Auth listener {} registered, fired with current session", id);
        } else {
            debug!("Auth listener {} registered, newer session already delivered", id);
        }

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Set the first session value and release queued listeners
    ///
    /// Once initialized this behaves like `publish`.
    pub fn initialize(&self, session: Option<Session>) {
        self.publish(session);
    }

    /// Apply a session-change event and notify every listener
    pub fn publish(&self, session: Option<Session>) {
        let (generation, listeners): (u64, Vec<Arc<Listener>>) = {
            let mut registry = lock(&self.registry);
            if registry.generation == 0 {
                debug!("Auth state initialized");
            }
            registry.generation += 1;
            registry.session = session.clone();
            (
                registry.generation,
                registry.listeners.values().cloned().collect(),
            )
        };

        match &session {
            Some(s) => info!("Session active for {}", s.id),
            None => info!("Session cleared"),
        }

        for listener in &listeners {
            if !listener.deliver(generation, session.as_ref()) {
                debug!("Skipped superseded session update (generation {})", generation);
            }
        }
    }

    /// Current session snapshot
    pub fn current(&self) -> Option<Session> {
        lock(&self.registry).session.clone()
    }

    /// Whether the first session value has been received
    pub fn is_initialized(&self) -> bool {
        lock(&self.registry).generation > 0
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Initialize from the provider's current session
    pub async fn initialize_from(&self, provider: &dyn IdentityProvider) -> Result<()> {
        let session = provider.current_session().await?;
        self.initialize(session);
        Ok(())
    }

    /// Sign out at the provider, then broadcast the logout
    pub async fn sign_out(&self, provider: &dyn IdentityProvider) -> Result<()> {
        provider.sign_out().await?;
        self.publish(None);
        Ok(())
    }

    /// Forward a provider event stream into this broadcaster
    ///
    /// The task ends when the sending side is dropped.
    pub fn attach(&self, mut events: mpsc::Receiver<Option<Session>>) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            while let Some(session) = events.recv().await {
                broadcaster.publish(session);
            }
            debug!("Identity provider event stream closed");
        })
    }
}
