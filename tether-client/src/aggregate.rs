//! Multi-resource aggregator.
//!
//! Fans out to one cache entry per identifier and merges every loading change
//! and fetch outcome into a single [`MultiResourceState`], upserting by
//! identifier.

use crate::cache::{EntrySubscription, ResourceCache};
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::{dedup_ids, FetchEvent, MultiResourceState, ResourceId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, trace};

/// What a constituent entry reported.
#[derive(Debug, Clone)]
enum Signal {
    Loading(bool),
    Event(FetchEvent),
}

/// Projects many cache entries into one [`MultiResourceState`].
pub struct MultiBinding {
    cache: ResourceCache,
    ids: Vec<ResourceId>,
    refresh: bool,
    state: Arc<watch::Sender<MultiResourceState>>,
    epoch: Arc<AtomicU64>,
    subscriptions: Vec<EntrySubscription>,
    task: Option<JoinHandle<()>>,
}

impl MultiBinding {
    pub(crate) fn new<I, T>(cache: ResourceCache, ids: I, refresh: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        let (state, _) = watch::channel(MultiResourceState::default());
        let mut binding = Self {
            cache,
            ids: dedup_ids(ids),
            refresh,
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            subscriptions: Vec::new(),
            task: None,
        };
        binding.subscribe();
        binding
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn refresh(&self) -> bool {
        self.refresh
    }

    pub fn state(&self) -> MultiResourceState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MultiResourceState> {
        self.state.subscribe()
    }

    /// Wait until every requested identifier has an outcome and none is
    /// loading.
    pub async fn settled(&self) -> MultiResourceState {
        let ids = self.ids.clone();
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|state| {
                ids.iter().all(|id| {
                    state.loading.get(id) == Some(&false)
                        && (state.data_for(id).is_some() || state.error_for(id).is_some())
                })
            })
            .await
            .map(|state| (*state).clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Re-point the aggregator at a new identifier list.
    ///
    /// Any change to the list or the refresh flag re-subscribes everything.
    /// Before that, the previous state is filtered down to identifiers still
    /// requested so consumers never see an empty flash. New subscriptions are
    /// taken before the old ones are released, so identifiers that stay in
    /// the set are not fetched again.
    pub fn rebind<I, T>(&mut self, ids: I, refresh: bool)
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        let ids = dedup_ids(ids);
        if ids == self.ids && refresh == self.refresh {
            return;
        }
        debug!(count = ids.len(), refresh, "Rebinding resource set");

        self.detach();
        self.ids = ids;
        self.refresh = refresh;
        let keep = self.ids.clone();
        self.state.send_modify(|state| state.retain_ids(&keep));
        self.subscribe();
    }

    fn subscribe(&mut self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let mut streams: StreamMap<ResourceId, BoxStream<'static, Signal>> = StreamMap::new();
        let mut indicators = HashMap::with_capacity(self.ids.len());
        let mut subscriptions = Vec::with_capacity(self.ids.len());

        for id in &self.ids {
            let subscription = self.cache.get_or_create(id.clone()).subscribe(self.refresh);
            indicators.insert(id.clone(), subscription.loading());
            let loading = WatchStream::new(subscription.loading()).map(Signal::Loading);
            let events = WatchStream::new(subscription.events()).filter_map(|event| event.map(Signal::Event));
            streams.insert(id.clone(), Box::pin(loading.merge(events)));
            subscriptions.push(subscription);
        }

        self.state.send_modify(|state| {
            for subscription in &subscriptions {
                let id = subscription.entry().id();
                // Identifiers with a shown outcome only report loading while
                // their entry is actually fetching.
                let settled = state.data_for(id).is_some() || state.error_for(id).is_some();
                let loading = !settled || subscription.entry().is_loading();
                state.set_loading(id, loading);
            }
        });
        // Releases the previous holds only now that the new ones exist.
        self.subscriptions = subscriptions;

        let merger = Merger {
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
            current: epoch,
            indicators,
        };
        self.task = Some(tokio::spawn(merger.run(streams)));
    }

    /// Stop the running merger without releasing any subscription.
    fn detach(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn unsubscribe(&mut self) {
        self.detach();
        self.subscriptions.clear();
    }
}

impl Drop for MultiBinding {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Merger {
    state: Arc<watch::Sender<MultiResourceState>>,
    epoch: Arc<AtomicU64>,
    current: u64,
    indicators: HashMap<ResourceId, watch::Receiver<bool>>,
}

impl Merger {
    async fn run(self, mut streams: StreamMap<ResourceId, BoxStream<'static, Signal>>) {
        while let Some((id, signal)) = streams.next().await {
            let modified = self.state.send_if_modified(|state| {
                if self.epoch.load(Ordering::Acquire) != self.current {
                    return false;
                }
                let before = state.clone();
                match &signal {
                    Signal::Loading(loading) => state.set_loading(&id, *loading),
                    Signal::Event(event) => {
                        state.apply(&id, event);
                        // A replayed outcome while a fetch runs keeps the indicator on.
                        if self.is_fetching(&id) {
                            state.set_loading(&id, true);
                        }
                    }
                }
                *state != before
            });
            if modified {
                trace!(url = %id, "Aggregate state updated");
            }
        }
    }

    fn is_fetching(&self, id: &ResourceId) -> bool {
        self.indicators.get(id).is_some_and(|rx| *rx.borrow())
    }
}
