//! Poll scheduler: periodic re-activation of a cache entry.
//!
//! The poller never fetches at start; the subscription that turns polling on
//! activates the entry itself. Ticks follow at every period from there,
//! independent of how long fetches take. A tick that lands while a fetch is
//! still in flight is dropped by [`CacheEntry::activate`].

use crate::cache::CacheEntry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, trace};

/// Owner side of a running poller. Stopping or dropping it ends the task.
pub(crate) struct PollerHandle {
    shutdown: watch::Sender<bool>,
}

impl PollerHandle {
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

pub(crate) fn spawn_poller(entry: Arc<CacheEntry>, period: Duration) -> PollerHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(run_poller(entry, period, shutdown_rx));
    PollerHandle { shutdown }
}

async fn run_poller(entry: Arc<CacheEntry>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        url = %entry.id(),
        period = ?period,
        "Poller started"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let started = entry.activate();
                trace!(url = %entry.id(), started, "Poll tick");
            }
        }
    }

    info!(url = %entry.id(), "Poller stopped");
}
