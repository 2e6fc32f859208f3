//! Identity types for Tether resources

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Identifier of a fetchable JSON resource.
///
/// The identifier is the URL itself. It is the key of the dedup cache and the
/// key used when merging many resources into one aggregated state. Clones
/// share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self(Arc::from(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(url: &str) -> Self {
        Self(Arc::from(url))
    }
}

impl From<String> for ResourceId {
    fn from(url: String) -> Self {
        Self(Arc::from(url))
    }
}

impl From<&String> for ResourceId {
    fn from(url: &String) -> Self {
        Self(Arc::from(url.as_str()))
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Collapse a requested list of identifiers, keeping the first occurrence of
/// each so request order is preserved.
pub fn dedup_ids<I, T>(ids: I) -> Vec<ResourceId>
where
    I: IntoIterator<Item = T>,
    T: Into<ResourceId>,
{
    let mut out: Vec<ResourceId> = Vec::new();
    for id in ids {
        let id = id.into();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
