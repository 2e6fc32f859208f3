//! Tether Core - Data Types
//!
//! Pure data structures shared by the fetch cache and its consumers:
//! resource identifiers, fetch outcomes, failure causes, and the state shapes
//! handed to a rendering layer. This crate performs no I/O.

pub mod error;
pub mod event;
pub mod identity;
pub mod state;

pub use error::{ErrorBody, FetchFailure};
pub use event::FetchEvent;
pub use identity::{dedup_ids, ResourceId};
pub use state::{remove_by_id, upsert_by_id, Keyed, MultiResourceState, ResourceState};
