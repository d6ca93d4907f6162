/// Time source used for room timestamps.
pub mod clock;
/// Observer fan-out for WebSocket and SSE clients.
pub mod hub;
/// Room records and the in-memory registry.
pub mod registry;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    dao::kv_store::KvStore,
    services::registry_service::{RegistryConfig, RegistryHandle},
    state::clock::Clock,
};

pub use self::hub::{ObserverHub, SseHub};

/// Application state shared across handlers.
pub type SharedState = Arc<AppState>;

/// Events each SSE subscriber may lag behind before skipping ahead.
const SSE_CAPACITY: usize = 16;

/// Central application state: the registry handle, its observers and the storage backend.
pub struct AppState {
    registry: RegistryHandle,
    observers: Arc<ObserverHub>,
    store: Arc<dyn KvStore>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Hydrate a registry from `store` and wrap everything in a [`SharedState`].
    pub async fn bootstrap(
        config: RegistryConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let observers = Arc::new(ObserverHub::new(SSE_CAPACITY));
        let registry =
            RegistryHandle::spawn(config, store.clone(), observers.clone(), clock).await;
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            registry,
            observers,
            store,
            degraded: degraded_tx,
        })
    }

    /// Handle to the single-writer room registry.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Connected WebSocket observers and the SSE hub.
    pub fn observers(&self) -> &ObserverHub {
        &self.observers
    }

    /// Storage backend persisting the registry.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Current degraded flag, set while the storage backend fails its health checks.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
