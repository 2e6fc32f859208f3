//! Single-resource binding.

use crate::cache::{EntrySubscription, ResourceCache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::{FetchEvent, ResourceId, ResourceState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Projects one cache entry into a [`ResourceState`].
///
/// Dropping the binding stops its updates. The cache entry, any in-flight
/// fetch, and other consumers of the same resource are unaffected.
pub struct Binding {
    cache: ResourceCache,
    id: ResourceId,
    refresh: bool,
    state: Arc<watch::Sender<ResourceState>>,
    epoch: Arc<AtomicU64>,
    subscription: Option<EntrySubscription>,
    task: Option<JoinHandle<()>>,
}

impl Binding {
    pub(crate) fn new(cache: ResourceCache, id: ResourceId, refresh: bool) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        let mut binding = Self {
            cache,
            id,
            refresh,
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            subscription: None,
            task: None,
        };
        binding.subscribe();
        binding
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn refresh(&self) -> bool {
        self.refresh
    }

    /// Current state snapshot.
    pub fn state(&self) -> ResourceState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<ResourceState> {
        self.state.subscribe()
    }

    /// Wait until the binding is not loading and return that state.
    pub async fn settled(&self) -> ResourceState {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(|state| !state.loading).await.map(|state| (*state).clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Re-point the binding. Resubscribes when either input changed; does
    /// nothing otherwise.
    ///
    /// The new subscription is taken before the old one is released, so a
    /// refresh-only change never drops the entry to zero subscribers and
    /// never causes a cold-start fetch. Switching resources clears data and
    /// error so the previous resource's payload is never shown under the new
    /// identifier.
    pub fn rebind(&mut self, id: impl Into<ResourceId>, refresh: bool) {
        let id = id.into();
        if id == self.id && refresh == self.refresh {
            return;
        }
        debug!(from = %self.id, to = %id, refresh, "Rebinding resource");

        self.detach();
        let switched = id != self.id;
        self.id = id;
        self.refresh = refresh;
        if switched {
            self.state.send_modify(|state| {
                state.loading = true;
                state.data = None;
                state.error = None;
            });
        }
        self.subscribe();
    }

    fn subscribe(&mut self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let subscription = self.cache.get_or_create(self.id.clone()).subscribe(self.refresh);
        let projection = Projection {
            id: self.id.clone(),
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
            current: epoch,
        };
        self.task = Some(tokio::spawn(projection.run(
            subscription.events(),
            subscription.loading(),
        )));
        // Releases the previous hold only now that the new one exists.
        self.subscription = Some(subscription);
    }

    /// Stop the running projection without releasing the subscription.
    fn detach(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn unsubscribe(&mut self) {
        self.detach();
        self.subscription = None;
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Projection {
    id: ResourceId,
    state: Arc<watch::Sender<ResourceState>>,
    epoch: Arc<AtomicU64>,
    current: u64,
}

impl Projection {
    async fn run(
        self,
        mut events: watch::Receiver<Option<FetchEvent>>,
        mut loading: watch::Receiver<bool>,
    ) {
        // Late joiners see the retained outcome first, with whatever the
        // entry's indicator says right now.
        let replayed = events.borrow_and_update().clone();
        let mut seen_event = false;
        if let Some(event) = replayed {
            let indicator = *loading.borrow_and_update();
            self.publish(|state| {
                state.apply(&event);
                state.loading = indicator;
            });
            seen_event = true;
        }

        loop {
            tokio::select! {
                biased;

                changed = events.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let event = events.borrow_and_update().clone();
                    if let Some(event) = event {
                        self.publish(|state| {
                            state.apply(&event);
                            state.loading = false;
                        });
                        seen_event = true;
                    }
                }
                changed = loading.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let indicator = *loading.borrow_and_update();
                    // Until the first outcome arrives the binding stays loading.
                    if seen_event {
                        self.publish(|state| state.loading = indicator);
                    }
                }
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut ResourceState)) {
        let modified = self.state.send_if_modified(|state| {
            // A rebind happened; this projection is stale.
            if self.epoch.load(Ordering::Acquire) != self.current {
                return false;
            }
            let before = state.clone();
            update(state);
            *state != before
        });
        if modified {
            trace!(url = %self.id, "Binding state updated");
        }
    }
}
