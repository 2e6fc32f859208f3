//! The outcome of one fetch attempt.

use crate::error::FetchFailure;
use serde_json::Value;

/// Outcome of a single fetch attempt. Exactly one variant per attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// A 2xx response with a JSON body.
    Value { body: Value, status: u16 },
    /// Anything else.
    Error(FetchFailure),
}

impl FetchEvent {
    pub fn value(body: Value, status: u16) -> Self {
        FetchEvent::Value { body, status }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, FetchEvent::Value { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FetchEvent::Error(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            FetchEvent::Value { body, .. } => Some(body),
            FetchEvent::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            FetchEvent::Value { .. } => None,
            FetchEvent::Error(failure) => Some(failure),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchEvent::Value { status, .. } => Some(*status),
            FetchEvent::Error(failure) => failure.status(),
        }
    }
}

impl From<FetchFailure> for FetchEvent {
    fn from(failure: FetchFailure) -> Self {
        FetchEvent::Error(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use serde_json::json;

    #[test]
    fn test_value_accessors() {
        let event = FetchEvent::value(json!({"a": 1}), 200);
        assert!(event.is_value());
        assert!(!event.is_error());
        assert_eq!(event.payload(), Some(&json!({"a": 1})));
        assert_eq!(event.status(), Some(200));
        assert!(event.failure().is_none());
    }

    #[test]
    fn test_error_accessors() {
        let event = FetchEvent::from(FetchFailure::Status {
            url: "Y".to_string(),
            status: 500,
            status_text: None,
            body: ErrorBody::Text("oops".to_string()),
        });
        assert!(!event.is_value());
        assert!(event.payload().is_none());
        assert_eq!(event.status(), Some(500));
        assert_eq!(event.failure().and_then(FetchFailure::text), Some("oops"));
    }
}
