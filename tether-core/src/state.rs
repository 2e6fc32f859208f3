//! Consumer-visible state projected from fetch events.
//!
//! Both shapes serialize to JSON so a rendering layer can display them as-is.

use crate::error::FetchFailure;
use crate::event::FetchEvent;
use crate::identity::ResourceId;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// UPSERT-BY-IDENTIFIER
// ============================================================================

/// A value tagged with the resource it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyed<T> {
    pub id: ResourceId,
    pub value: T,
}

impl<T> Keyed<T> {
    pub fn new(id: ResourceId, value: T) -> Self {
        Self { id, value }
    }
}

/// Replace the entry for `id` in place, or append a new one.
pub fn upsert_by_id<T>(items: &mut Vec<Keyed<T>>, id: &ResourceId, value: T) {
    match items.iter_mut().find(|item| &item.id == id) {
        Some(existing) => existing.value = value,
        None => items.push(Keyed::new(id.clone(), value)),
    }
}

/// Remove the entry for `id`. Returns whether anything was removed.
pub fn remove_by_id<T>(items: &mut Vec<Keyed<T>>, id: &ResourceId) -> bool {
    let before = items.len();
    items.retain(|item| &item.id != id);
    items.len() != before
}

// ============================================================================
// SINGLE RESOURCE
// ============================================================================

/// State of one bound resource.
///
/// `data` and `error` are never both populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState {
    pub loading: bool,
    pub data: Option<Value>,
    pub error: Option<FetchFailure>,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self {
            loading: true,
            data: None,
            error: None,
        }
    }
}

impl ResourceState {
    /// Project a fetch event onto data/error. Does not touch `loading`.
    pub fn apply(&mut self, event: &FetchEvent) {
        match event {
            FetchEvent::Value { body, .. } => {
                self.data = Some(body.clone());
                self.error = None;
            }
            FetchEvent::Error(failure) => {
                self.data = None;
                self.error = Some(failure.clone());
            }
        }
    }

    /// True once a value or error has been received and nothing is loading.
    pub fn is_settled(&self) -> bool {
        !self.loading && (self.data.is_some() || self.error.is_some())
    }
}

// ============================================================================
// MANY RESOURCES
// ============================================================================

/// Aggregated state of a set of bound resources.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MultiResourceState {
    pub loading: BTreeMap<ResourceId, bool>,
    pub data: Vec<Keyed<Value>>,
    pub error: Vec<Keyed<FetchFailure>>,
}

impl MultiResourceState {
    pub fn set_loading(&mut self, id: &ResourceId, loading: bool) {
        self.loading.insert(id.clone(), loading);
    }

    /// Merge one fetch event for `id`.
    ///
    /// A value clears that identifier's error entry and an error clears its
    /// data entry, so each identifier shows at most one of the two. The
    /// identifier stops loading.
    pub fn apply(&mut self, id: &ResourceId, event: &FetchEvent) {
        match event {
            FetchEvent::Value { body, .. } => {
                upsert_by_id(&mut self.data, id, body.clone());
                remove_by_id(&mut self.error, id);
            }
            FetchEvent::Error(failure) => {
                upsert_by_id(&mut self.error, id, failure.clone());
                remove_by_id(&mut self.data, id);
            }
        }
        self.set_loading(id, false);
    }

    /// Drop everything about identifiers that are no longer requested.
    pub fn retain_ids(&mut self, ids: &[ResourceId]) {
        self.loading.retain(|id, _| ids.contains(id));
        self.data.retain(|item| ids.contains(&item.id));
        self.error.retain(|item| ids.contains(&item.id));
    }

    /// True while any identifier is loading.
    pub fn is_loading(&self) -> bool {
        self.loading.values().any(|loading| *loading)
    }

    pub fn data_for(&self, id: &ResourceId) -> Option<&Value> {
        self.data.iter().find(|item| &item.id == id).map(|item| &item.value)
    }

    pub fn error_for(&self, id: &ResourceId) -> Option<&FetchFailure> {
        self.error.iter().find(|item| &item.id == id).map(|item| &item.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn server_error(url: &str) -> FetchFailure {
        FetchFailure::Status {
            url: url.to_string(),
            status: 500,
            status_text: None,
            body: ErrorBody::Text("oops".to_string()),
        }
    }

    #[test]
    fn test_upsert_replaces_in_place_and_appends_new() {
        let mut items = Vec::new();
        upsert_by_id(&mut items, &id("a"), 1);
        upsert_by_id(&mut items, &id("b"), 2);
        upsert_by_id(&mut items, &id("a"), 3);
        assert_eq!(items, vec![Keyed::new(id("a"), 3), Keyed::new(id("b"), 2)]);
    }

    #[test]
    fn test_single_state_starts_loading() {
        let state = ResourceState::default();
        assert!(state.loading);
        assert!(state.data.is_none());
        assert!(state.error.is_none());
        assert!(!state.is_settled());
    }

    #[test]
    fn test_single_state_value_and_error_are_exclusive() {
        let mut state = ResourceState::default();
        state.apply(&FetchEvent::Error(server_error("X")));
        assert!(state.data.is_none());
        assert!(state.error.is_some());

        state.apply(&FetchEvent::value(json!({"a": 1}), 200));
        assert_eq!(state.data, Some(json!({"a": 1})));
        assert!(state.error.is_none());

        state.apply(&FetchEvent::Error(server_error("X")));
        assert!(state.data.is_none());
        assert!(state.error.is_some());
    }

    #[test]
    fn test_multi_state_later_value_clears_error() {
        let mut state = MultiResourceState::default();
        state.apply(&id("Y"), &FetchEvent::Error(server_error("Y")));
        assert!(state.error_for(&id("Y")).is_some());

        state.apply(&id("Y"), &FetchEvent::value(json!([1, 2]), 200));
        assert!(state.error_for(&id("Y")).is_none());
        assert_eq!(state.data_for(&id("Y")), Some(&json!([1, 2])));
        assert_eq!(state.loading.get(&id("Y")), Some(&false));
    }

    #[test]
    fn test_multi_state_retain_ids() {
        let mut state = MultiResourceState::default();
        state.apply(&id("X"), &FetchEvent::value(json!(1), 200));
        state.apply(&id("Y"), &FetchEvent::Error(server_error("Y")));
        state.set_loading(&id("Z"), true);

        state.retain_ids(&[id("X")]);
        assert_eq!(state.data.len(), 1);
        assert!(state.error.is_empty());
        assert_eq!(state.loading.len(), 1);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_multi_state_serializes_for_rendering() {
        let mut state = MultiResourceState::default();
        state.apply(&id("X"), &FetchEvent::value(json!({"a": 1}), 200));
        let rendered = serde_json::to_value(&state).unwrap();
        assert_eq!(rendered["loading"]["X"], json!(false));
        assert_eq!(rendered["data"][0]["id"], json!("X"));
        assert_eq!(rendered["data"][0]["value"], json!({"a": 1}));
        assert_eq!(rendered["error"], json!([]));
    }
}
