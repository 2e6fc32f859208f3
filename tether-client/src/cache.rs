//! Dedup cache: one shared fetch pipeline per resource.
//!
//! ## Architecture
//!
//! - [`ResourceCache`] is the registry. Entries are created lazily on first
//!   request and live as long as the registry (no eviction).
//! - [`CacheEntry`] owns two `watch` channels: the latest [`FetchEvent`]
//!   (replayed to late joiners) and the loading indicator.
//! - Every consumer holds an [`EntrySubscription`]. The first subscription
//!   triggers the cold-start fetch; subscriptions that asked for refresh keep
//!   the entry's poller alive.
//! - At most one fetch per entry is in flight. Activations requested while
//!   one is running are dropped.

use crate::aggregate::MultiBinding;
use crate::binding::Binding;
use crate::config::{ConfigError, EngineConfig};
use crate::error::TetherError;
use crate::fetcher::ResourceFetcher;
use crate::poll::{self, PollerHandle};
use crate::transport::{HttpTransport, ReqwestTransport};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tether_core::{FetchEvent, ResourceId};
use tokio::sync::watch;
use tracing::debug;

// ============================================================================
// REGISTRY
// ============================================================================

/// Registry of cache entries keyed by resource identifier.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct ResourceCache {
    entries: Arc<DashMap<ResourceId, Arc<CacheEntry>>>,
    fetcher: ResourceFetcher,
    config: Arc<EngineConfig>,
}

impl ResourceCache {
    pub fn new(config: EngineConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entries: Arc::new(DashMap::new()),
            fetcher: ResourceFetcher::new(transport),
            config: Arc::new(config),
        })
    }

    /// Cache backed by a reqwest client.
    pub fn with_reqwest(config: EngineConfig) -> Result<Self, TetherError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport))?)
    }

    /// Return the entry for `id`, creating it on first request.
    ///
    /// Never triggers a fetch by itself. The entry API makes creation atomic,
    /// so racing callers all receive the first writer's entry.
    pub fn get_or_create(&self, id: impl Into<ResourceId>) -> Arc<CacheEntry> {
        let id = id.into();
        let entry = self.entries.entry(id.clone()).or_insert_with(|| {
            debug!(url = %id, "Creating cache entry");
            Arc::new(CacheEntry::new(
                id.clone(),
                self.fetcher.clone(),
                self.config.poll_interval,
            ))
        });
        entry.clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. Live bindings keep the entries they already hold.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bind one consumer to one resource. Must be called inside a Tokio runtime.
    pub fn bind(&self, id: impl Into<ResourceId>, refresh: bool) -> Binding {
        Binding::new(self.clone(), id.into(), refresh)
    }

    /// Bind one consumer to a set of resources. Must be called inside a Tokio runtime.
    pub fn bind_many<I, T>(&self, ids: I, refresh: bool) -> MultiBinding
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        MultiBinding::new(self.clone(), ids, refresh)
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
struct EntryMetrics {
    activations: AtomicU64,
    skipped_activations: AtomicU64,
    completed_fetches: AtomicU64,
    failed_fetches: AtomicU64,
}

/// Snapshot of an entry's activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    /// Activations that started a fetch.
    pub activations: u64,
    /// Activations dropped because a fetch was already in flight.
    pub skipped_activations: u64,
    pub completed_fetches: u64,
    pub failed_fetches: u64,
    pub subscribers: usize,
    pub pollers: usize,
    pub polling: bool,
}

// ============================================================================
// ENTRY
// ============================================================================

#[derive(Default)]
struct RefCounts {
    subscribers: usize,
    pollers: usize,
    poller: Option<PollerHandle>,
}

/// Shared fetch pipeline for one resource.
pub struct CacheEntry {
    id: ResourceId,
    fetcher: ResourceFetcher,
    poll_interval: Duration,
    events: watch::Sender<Option<FetchEvent>>,
    loading: watch::Sender<bool>,
    in_flight: AtomicBool,
    refs: Mutex<RefCounts>,
    metrics: EntryMetrics,
}

impl CacheEntry {
    fn new(id: ResourceId, fetcher: ResourceFetcher, poll_interval: Duration) -> Self {
        let (events, _) = watch::channel(None);
        let (loading, _) = watch::channel(false);
        Self {
            id,
            fetcher,
            poll_interval,
            events,
            loading,
            in_flight: AtomicBool::new(false),
            refs: Mutex::new(RefCounts::default()),
            metrics: EntryMetrics::default(),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Most recently delivered outcome, if any.
    pub fn latest(&self) -> Option<FetchEvent> {
        self.events.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn stats(&self) -> EntryStats {
        let refs = self.lock_refs();
        EntryStats {
            activations: self.metrics.activations.load(Ordering::Relaxed),
            skipped_activations: self.metrics.skipped_activations.load(Ordering::Relaxed),
            completed_fetches: self.metrics.completed_fetches.load(Ordering::Relaxed),
            failed_fetches: self.metrics.failed_fetches.load(Ordering::Relaxed),
            subscribers: refs.subscribers,
            pollers: refs.pollers,
            polling: refs.poller.is_some(),
        }
    }

    /// Register a consumer.
    ///
    /// The first subscriber triggers a cold-start fetch. A subscriber asking
    /// for refresh when nobody else did starts the poller and also fetches
    /// immediately. Must be called inside a Tokio runtime.
    pub fn subscribe(self: &Arc<Self>, refresh: bool) -> EntrySubscription {
        let (cold_start, polling_started) = {
            let mut refs = self.lock_refs();
            refs.subscribers += 1;
            let cold_start = refs.subscribers == 1;
            let mut polling_started = false;
            if refresh {
                refs.pollers += 1;
                if refs.pollers == 1 {
                    refs.poller = Some(poll::spawn_poller(Arc::clone(self), self.poll_interval));
                    polling_started = true;
                }
            }
            debug!(
                url = %self.id,
                subscribers = refs.subscribers,
                pollers = refs.pollers,
                "Subscribed to cache entry"
            );
            (cold_start, polling_started)
        };

        let subscription = EntrySubscription {
            entry: Arc::clone(self),
            refresh,
            events: self.events.subscribe(),
            loading: self.loading.subscribe(),
        };

        if cold_start || polling_started {
            self.activate();
        }
        subscription
    }

    fn release(&self, refresh: bool) {
        let mut refs = self.lock_refs();
        refs.subscribers = refs.subscribers.saturating_sub(1);
        if refresh {
            refs.pollers = refs.pollers.saturating_sub(1);
            if refs.pollers == 0 {
                if let Some(poller) = refs.poller.take() {
                    poller.stop();
                }
            }
        }
        debug!(
            url = %self.id,
            subscribers = refs.subscribers,
            pollers = refs.pollers,
            "Released cache entry subscription"
        );
    }

    /// Start a fetch unless one is already in flight.
    ///
    /// Returns whether a fetch was started. The outcome is published to every
    /// subscriber before the loading indicator returns to false.
    pub fn activate(self: &Arc<Self>) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.skipped_activations.fetch_add(1, Ordering::Relaxed);
            debug!(url = %self.id, "Fetch already in flight, activation dropped");
            return false;
        }

        self.metrics.activations.fetch_add(1, Ordering::Relaxed);
        self.loading.send_replace(true);

        let entry = Arc::clone(self);
        tokio::spawn(async move {
            let _in_flight = InFlightGuard { entry: &entry };
            let event = entry.fetcher.fetch(&entry.id).await;
            if event.is_error() {
                entry.metrics.failed_fetches.fetch_add(1, Ordering::Relaxed);
            }
            entry.metrics.completed_fetches.fetch_add(1, Ordering::Relaxed);
            entry.events.send_replace(Some(event));
        });
        true
    }

    fn lock_refs(&self) -> MutexGuard<'_, RefCounts> {
        self.refs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-flight flag and the loading indicator when a fetch task
/// finishes, including by panic.
struct InFlightGuard<'a> {
    entry: &'a CacheEntry,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.entry.loading.send_replace(false);
        self.entry.in_flight.store(false, Ordering::Release);
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// A consumer's hold on a cache entry. Dropping it releases the hold; the
/// entry and any in-flight fetch are unaffected.
pub struct EntrySubscription {
    entry: Arc<CacheEntry>,
    refresh: bool,
    events: watch::Receiver<Option<FetchEvent>>,
    loading: watch::Receiver<bool>,
}

impl EntrySubscription {
    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }

    pub fn refresh(&self) -> bool {
        self.refresh
    }

    /// Receiver of fetch outcomes. Its current value is the latest outcome.
    pub fn events(&self) -> watch::Receiver<Option<FetchEvent>> {
        self.events.clone()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.clone()
    }
}

impl Drop for EntrySubscription {
    fn drop(&mut self) {
        self.entry.release(self.refresh);
    }
}
