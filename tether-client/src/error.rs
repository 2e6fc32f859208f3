//! Error types for constructing the fetch cache.
//!
//! Fetch failures are not errors at this level; they travel to consumers as
//! [`tether_core::FetchEvent::Error`].

use crate::config::ConfigError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
