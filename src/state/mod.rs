//! Shared application state and the coordination primitives carved out of it.

/// Circuit breaker for remote collections.
pub mod availability;
/// Named publish/subscribe topics.
pub mod channels;
/// Community event records and their lifecycle.
pub mod event;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::dao::SyncStore;
use crate::dao::local::LocalStore;
use crate::state::availability::AvailabilityGuard;
use crate::state::channels::ChannelHub;
use crate::state::event::EventRecord;

/// Cheaply clonable handle to the process-wide state.
pub type SharedState = Arc<AppState>;

/// Per-topic broadcast buffer size.
const CHANNEL_CAPACITY: usize = 32;

/// Central application state: store handles, the availability guard, the
/// broadcast hub, and the scheduler's event slots.
pub struct AppState {
    config: AppConfig,
    remote: RwLock<Option<Arc<dyn SyncStore>>>,
    local: Arc<LocalStore>,
    guard: AvailabilityGuard,
    channels: ChannelHub,
    current_event: RwLock<Option<EventRecord>>,
    pending_event: RwLock<Option<EventRecord>>,
    schedule_gate: Mutex<()>,
    countdown_task: Mutex<Option<JoinHandle<()>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The layer starts degraded until the storage supervisor installs a
    /// remote store.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            remote: RwLock::new(None),
            local: Arc::new(LocalStore::new()),
            guard: AvailabilityGuard::new(),
            channels: ChannelHub::new(CHANNEL_CAPACITY),
            current_event: RwLock::new(None),
            pending_event: RwLock::new(None),
            schedule_gate: Mutex::new(()),
            countdown_task: Mutex::new(None),
            degraded: degraded_tx,
        })
    }

    /// State for a process without a realtime transport: broadcasts become
    /// silent no-ops while everything else keeps working.
    pub fn new_without_transport(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            remote: RwLock::new(None),
            local: Arc::new(LocalStore::new()),
            guard: AvailabilityGuard::new(),
            channels: ChannelHub::disabled(CHANNEL_CAPACITY),
            current_event: RwLock::new(None),
            pending_event: RwLock::new(None),
            schedule_gate: Mutex::new(()),
            countdown_task: Mutex::new(None),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the remote store, if one is installed.
    pub async fn remote_store(&self) -> Option<Arc<dyn SyncStore>> {
        let guard = self.remote.read().await;
        guard.as_ref().cloned()
    }

    /// Install a remote store implementation and leave degraded mode.
    pub async fn install_remote_store(&self, store: Arc<dyn SyncStore>) {
        {
            let mut guard = self.remote.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the remote store and enter degraded mode.
    pub async fn clear_remote_store(&self) {
        {
            let mut guard = self.remote.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Whether the layer currently runs on local fallback storage only.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.remote.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// The always-available in-process fallback store.
    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Availability guard tracking missing remote collections.
    pub fn guard(&self) -> &AvailabilityGuard {
        &self.guard
    }

    /// Named broadcast topics.
    pub fn channels(&self) -> &ChannelHub {
        &self.channels
    }

    /// The announced or running event, if any.
    pub fn current_event(&self) -> &RwLock<Option<EventRecord>> {
        &self.current_event
    }

    /// The next scheduled, not-yet-announced event.
    pub fn pending_event(&self) -> &RwLock<Option<EventRecord>> {
        &self.pending_event
    }

    /// Gate serializing scheduling decisions so at most one pending event
    /// ever exists.
    pub fn schedule_gate(&self) -> &Mutex<()> {
        &self.schedule_gate
    }

    /// Install the countdown task for a freshly announced event, aborting
    /// any stale one left over from a superseded event.
    pub async fn replace_countdown_task(&self, task: Option<JoinHandle<()>>) {
        let mut slot = self.countdown_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = task;
    }

    async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }
        let _ = self.degraded.send(value);
    }
}
