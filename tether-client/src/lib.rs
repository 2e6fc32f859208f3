//! Tether client: a deduplicating, optionally polling JSON fetch cache with
//! reactive bindings.
//!
//! ```ignore
//! use tether_client::{EngineConfig, ResourceCache};
//!
//! let cache = ResourceCache::with_reqwest(EngineConfig::default())?;
//!
//! // One resource, revalidated every second.
//! let one = cache.bind("https://api.example.com/item", true);
//! let state = one.settled().await;
//!
//! // Many resources merged by identifier.
//! let many = cache.bind_many(["https://a.example.com", "https://b.example.com"], false);
//! let merged = many.settled().await;
//! ```

pub mod aggregate;
pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
mod poll;
pub mod transport;

pub use aggregate::MultiBinding;
pub use binding::Binding;
pub use cache::{CacheEntry, EntryStats, EntrySubscription, ResourceCache};
pub use config::{ConfigError, EngineConfig, DEFAULT_POLL_INTERVAL};
pub use error::TetherError;
pub use fetcher::{classify_response, ResourceFetcher};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};

pub use tether_core::{
    ErrorBody, FetchEvent, FetchFailure, Keyed, MultiResourceState, ResourceId, ResourceState,
};
