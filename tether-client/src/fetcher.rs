//! Resource fetcher: one GET, one [`FetchEvent`].

use crate::transport::{HttpResponse, HttpTransport};
use std::sync::Arc;
use tether_core::{ErrorBody, FetchEvent, FetchFailure, ResourceId};
use tracing::{debug, warn};

/// Performs single fetch attempts. Never retries and never times out.
#[derive(Clone)]
pub struct ResourceFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl ResourceFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self, id: &ResourceId) -> FetchEvent {
        let event = match self.transport.get(id.as_str()).await {
            Ok(response) => classify_response(id, response),
            Err(err) => FetchEvent::Error(FetchFailure::Network {
                url: id.to_string(),
                message: err.to_string(),
            }),
        };

        match &event {
            FetchEvent::Value { status, .. } => {
                debug!(url = %id, status, "Fetch succeeded");
            }
            FetchEvent::Error(failure) => {
                warn!(url = %id, status = ?failure.status(), error = %failure, "Fetch failed");
            }
        }
        event
    }
}

/// Map a raw response onto a fetch outcome.
///
/// Non-2xx responses keep their body as parsed JSON when possible, raw text
/// otherwise. A 2xx body that is not JSON is an `InvalidBody` error.
pub fn classify_response(id: &ResourceId, response: HttpResponse) -> FetchEvent {
    if !response.is_success() {
        return FetchEvent::Error(FetchFailure::Status {
            url: id.to_string(),
            status: response.status,
            status_text: response.status_text,
            body: ErrorBody::from_raw(&response.body),
        });
    }

    match serde_json::from_str(&response.body) {
        Ok(body) => FetchEvent::Value {
            body,
            status: response.status,
        },
        Err(err) => FetchEvent::Error(FetchFailure::InvalidBody {
            url: id.to_string(),
            status: response.status,
            text: response.body,
            reason: err.to_string(),
        }),
    }
}
