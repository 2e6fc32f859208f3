//! Property-Based Tests for the Poll Scheduler
//!
//! **Property: Activation count**
//!
//! Without refresh a binding fetches exactly once for its whole lifetime.
//! With refresh and period P, absent overlap, it has fetched floor(T/P)+1
//! times by time T. Ticks landing on an in-flight fetch are dropped.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether_test_utils::{test_cache_with_interval, MockReply, MockTransport};

const PERIOD: Duration = Duration::from_millis(100);

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

fn instant_mock() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new());
    mock.respond("X", MockReply::ok(json!({"a": 1})));
    mock
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn refresh_fetches_floor_t_over_p_plus_one(periods in 0u64..12, offset_ms in 10u64..90) {
        let mock = instant_mock();
        let cache = test_cache_with_interval(mock.clone(), PERIOD);
        let elapsed = PERIOD * periods as u32 + Duration::from_millis(offset_ms);

        paused_runtime().block_on(async {
            let _binding = cache.bind("X", true);
            tokio::time::sleep(elapsed).await;
        });

        let expected = (elapsed.as_millis() / PERIOD.as_millis()) as usize + 1;
        prop_assert_eq!(mock.calls("X"), expected);
    }

    #[test]
    fn no_refresh_fetches_once(seconds in 1u64..60) {
        let mock = instant_mock();
        let cache = test_cache_with_interval(mock.clone(), PERIOD);

        paused_runtime().block_on(async {
            let binding = cache.bind("X", false);
            binding.settled().await;
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        });

        prop_assert_eq!(mock.calls("X"), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_dropped() {
    let mock = instant_mock();
    mock.with_delay("X", Duration::from_millis(250));
    let cache = test_cache_with_interval(mock.clone(), PERIOD);

    let binding = cache.bind("X", true);
    // Fetches start at 0, 300 and 600; ticks at 100, 200, 400, 500 find one in flight.
    tokio::time::sleep(Duration::from_millis(650)).await;

    assert_eq!(mock.calls("X"), 3);
    assert_eq!(mock.max_in_flight("X"), 1);
    let stats = cache.get_or_create("X").stats();
    assert_eq!(stats.activations, 3);
    assert_eq!(stats.skipped_activations, 4);
    assert_eq!(stats.completed_fetches, 2);
    drop(binding);
}

#[tokio::test(start_paused = true)]
async fn dropping_last_refresh_consumer_stops_polling() {
    let mock = instant_mock();
    let cache = test_cache_with_interval(mock.clone(), PERIOD);

    let binding = cache.bind("X", true);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(mock.calls("X"), 3);

    drop(binding);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.calls("X"), 3);

    let stats = cache.get_or_create("X").stats();
    assert!(!stats.polling);
    assert_eq!(stats.pollers, 0);
}

#[tokio::test(start_paused = true)]
async fn any_refresh_consumer_keeps_identifier_polling() {
    let mock = instant_mock();
    let cache = test_cache_with_interval(mock.clone(), PERIOD);

    let quiet = cache.bind("X", false);
    quiet.settled().await;
    assert_eq!(mock.calls("X"), 1);

    // Turning refresh on for the identifier fetches right away, then every period.
    let polling = cache.bind("X", true);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(mock.calls("X"), 4);
    assert_eq!(quiet.state().data, Some(json!({"a": 1})));

    drop(polling);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.calls("X"), 4);
    assert_eq!(cache.get_or_create("X").stats().subscribers, 1);
}

#[tokio::test(start_paused = true)]
async fn loading_toggles_around_each_poll() {
    let mock = instant_mock();
    mock.with_delay("X", Duration::from_millis(20));
    let cache = test_cache_with_interval(mock.clone(), PERIOD);

    let binding = cache.bind("X", true);
    let mut rx = binding.watch();
    rx.wait_for(|state| !state.loading && state.data.is_some()).await.unwrap();

    // Next tick at 100ms sets loading again, then it settles at 120ms.
    rx.wait_for(|state| state.loading).await.unwrap();
    let reloading = binding.state();
    assert_eq!(reloading.data, Some(json!({"a": 1})));
    rx.wait_for(|state| !state.loading).await.unwrap();
    assert_eq!(mock.calls("X"), 2);
}
