//! Tether Test Utilities
//!
//! Shared test infrastructure for the Tether workspace:
//! - Scripted mock HTTP transport with call accounting
//! - Proptest generators for identifiers, statuses and JSON bodies
//! - Fixtures for common cache setups
//! - Tracing initialization for test output

pub use tether_client::{
    EngineConfig, HttpResponse, HttpTransport, ResourceCache, TransportError,
};
pub use tether_core::{ErrorBody, FetchEvent, FetchFailure, ResourceId};

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Json { status: u16, body: Value },
    Text { status: u16, body: String },
    NetworkError(String),
}

impl MockReply {
    pub fn ok(body: Value) -> Self {
        MockReply::Json { status: 200, body }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        MockReply::Text {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Route {
    /// Replies are consumed front to back; the last one repeats forever.
    replies: VecDeque<MockReply>,
    delay: Duration,
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, Route>,
    calls: HashMap<String, usize>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Scripted [`HttpTransport`]. Unknown URLs answer 404 with a text body.
///
/// Delays use `tokio::time::sleep`, so tests running with a paused clock get
/// deterministic timing.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, reply: MockReply) -> &Self {
        self.respond_sequence(url, vec![reply])
    }

    pub fn respond_json(&self, url: &str, status: u16, body: Value) -> &Self {
        self.respond(url, MockReply::Json { status, body })
    }

    pub fn respond_text(&self, url: &str, status: u16, body: &str) -> &Self {
        self.respond(url, MockReply::text(status, body))
    }

    pub fn fail(&self, url: &str, message: &str) -> &Self {
        self.respond(url, MockReply::NetworkError(message.to_string()))
    }

    /// Script successive replies for `url`. The last reply repeats.
    pub fn respond_sequence(&self, url: &str, replies: Vec<MockReply>) -> &Self {
        let mut state = self.lock();
        state.routes.entry(url.to_string()).or_default().replies = replies.into();
        self
    }

    /// Make every request to `url` take `delay` before answering.
    pub fn with_delay(&self, url: &str, delay: Duration) -> &Self {
        let mut state = self.lock();
        state.routes.entry(url.to_string()).or_default().delay = delay;
        self
    }

    /// Number of GETs issued for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.lock().calls.get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Highest number of simultaneous GETs observed for `url`.
    pub fn max_in_flight(&self, url: &str) -> usize {
        self.lock().max_in_flight.get(url).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, url: &str) -> (Option<MockReply>, Duration) {
        let mut state = self.lock();
        *state.calls.entry(url.to_string()).or_insert(0) += 1;
        let in_flight = {
            let count = state.in_flight.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let max = state.max_in_flight.entry(url.to_string()).or_insert(0);
        *max = (*max).max(in_flight);

        match state.routes.get_mut(url) {
            Some(route) => {
                let reply = if route.replies.len() > 1 {
                    route.replies.pop_front()
                } else {
                    route.replies.front().cloned()
                };
                (reply, route.delay)
            }
            None => (None, Duration::ZERO),
        }
    }

    fn finish(&self, url: &str) {
        let mut state = self.lock();
        if let Some(count) = state.in_flight.get_mut(url) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let (reply, delay) = self.begin(url);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.finish(url);

        match reply {
            Some(MockReply::Json { status, body }) => Ok(HttpResponse::new(status, body.to_string())),
            Some(MockReply::Text { status, body }) => Ok(HttpResponse::new(status, body)),
            Some(MockReply::NetworkError(message)) => Err(TransportError::Other(message)),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A cache over `transport` with the development poll interval.
pub fn test_cache(transport: Arc<MockTransport>) -> ResourceCache {
    test_cache_with_interval(transport, EngineConfig::development().poll_interval)
}

pub fn test_cache_with_interval(transport: Arc<MockTransport>, poll_interval: Duration) -> ResourceCache {
    let config = EngineConfig::default().with_poll_interval(poll_interval);
    match ResourceCache::new(config, transport) {
        Ok(cache) => cache,
        Err(err) => panic!("test cache config rejected: {err}"),
    }
}

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Resource identifiers that look like URLs.
pub fn arb_resource_url() -> impl Strategy<Value = String> {
    "[a-z]{1,8}".prop_map(|path| format!("https://api.test/{path}"))
}

pub fn arb_success_status() -> impl Strategy<Value = u16> {
    200u16..300
}

pub fn arb_failure_status() -> impl Strategy<Value = u16> {
    prop_oneof![100u16..200, 300u16..600]
}

/// Small JSON documents.
pub fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Text that never parses as JSON.
pub fn arb_non_json_text() -> impl Strategy<Value = String> {
    "[a-z]{1,16}"
        .prop_filter("must not be a JSON literal", |text| {
            serde_json::from_str::<Value>(text).is_err()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sequence_repeats_last_reply() {
        let mock = MockTransport::new();
        mock.respond_sequence(
            "X",
            vec![MockReply::ok(json!(1)), MockReply::text(500, "oops")],
        );

        assert_eq!(mock.get("X").await.unwrap().body, "1");
        assert_eq!(mock.get("X").await.unwrap().status, 500);
        assert_eq!(mock.get("X").await.unwrap().status, 500);
        assert_eq!(mock.calls("X"), 3);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let mock = MockTransport::new();
        let response = mock.get("nowhere").await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(mock.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_network_error() {
        let mock = MockTransport::new();
        mock.fail("X", "connection refused");
        assert!(matches!(mock.get("X").await, Err(TransportError::Other(_))));
    }
}
