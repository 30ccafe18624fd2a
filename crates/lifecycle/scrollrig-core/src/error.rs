//! Error types for the lifecycle core.
//!
//! Nothing in the core raises to a top-level handler: every variant is contained at the
//! boundary of the component that produced it, logged, and recorded in diagnostics.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LifecycleError {
    /// Missing required source or element; the feature is skipped.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Native engine construction or load failure; no instance is registered.
    #[error("Failed to create animation resource for '{target}': {reason}")]
    ResourceCreation { target: String, reason: String },

    /// Named input or state machine missing; the instance keeps running without it.
    #[error("Trigger '{trigger}' not found in state machine '{state_machine}'")]
    TriggerNotFound {
        state_machine: String,
        trigger: String,
    },

    /// Registry id collision.
    #[error("Animation set '{id}' already exists")]
    DuplicateId { id: String },

    #[error("Animation set not found: {id}")]
    UnknownAnimationSet { id: String },

    /// Malformed media query, boundary expression or margin.
    #[error("Cannot parse {what} '{input}': {reason}")]
    Parse {
        what: String,
        input: String,
        reason: String,
    },
}

impl LifecycleError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(what: &str, input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what: what.to_string(),
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure breaks the page. Always false: degradation is per feature.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        false
    }

    /// Only missing triggers and duplicate ids are warnings; everything else drops a resource.
    #[inline]
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::TriggerNotFound { .. } | Self::DuplicateId { .. }
        )
    }

    /// Error category for logging and diagnostics counters.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::Parse { .. } => "configuration",
            Self::ResourceCreation { .. } => "resource",
            Self::TriggerNotFound { .. } => "trigger",
            Self::DuplicateId { .. } => "duplicate",
            Self::UnknownAnimationSet { .. } => "lookup",
        }
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let err = LifecycleError::configuration("no source");
        assert_eq!(err.category(), "configuration");
        assert!(!err.is_warning());

        let warn = LifecycleError::TriggerNotFound {
            state_machine: "State Machine 1".into(),
            trigger: "Play".into(),
        };
        assert_eq!(warn.category(), "trigger");
        assert!(warn.is_warning());
        assert!(!warn.is_fatal());
    }

    #[test]
    fn messages_name_the_resource() {
        let err = LifecycleError::ResourceCreation {
            target: "card_02".into(),
            reason: "webgl context lost".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create animation resource for 'card_02': webgl context lost"
        );
    }

    #[test]
    fn test_serialization() {
        let error = LifecycleError::DuplicateId { id: "hero".into() };
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: LifecycleError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(error, deserialized);
    }
}
