//! Error types for MetaPlan
//!
//! Every failure is fatal to the current [`Interpreter::run`](crate::Interpreter::run)
//! call. Errors fall into three groups:
//! - Plan errors: the plan tree is malformed for the current state
//! - Reference errors: a `{"ref": ...}` field could not be resolved
//! - Result errors: a step result tripped a `fail_if` rule or cannot be folded
//!
//! Anything raised by the host's step runner or hooks is carried unmodified in
//! [`PlanError::Host`].

use serde_json::Value;

/// Main MetaPlan error type
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Plan lacks a configured required field
    #[error("plan does not include required field {field:?}")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// Binding name reused on the same root-to-leaf path
    #[error("{binding:?} already exists from a previous step")]
    DuplicateBinding {
        /// The reused binding name
        binding: String,
    },

    /// The `as` field is present but not a string
    #[error("binding name must be a string, got {value}")]
    InvalidBinding {
        /// The offending `as` value
        value: Value,
    },

    /// Reference names a container neither the host nor the state knows
    #[error("referenced unknown container {container:?}")]
    UnknownContainer {
        /// Container name from the reference
        container: String,
    },

    /// Container exists but lacks the referenced attribute
    #[error("referenced unknown attribute {attribute:?} on container {container:?} {available:?}")]
    UnknownAttribute {
        /// Container name from the reference
        container: String,
        /// Attribute name from the reference
        attribute: String,
        /// Keys the container does carry
        available: Vec<String>,
    },

    /// Reference descriptor is malformed (`ref` not a non-empty string)
    #[error("invalid reference in field {field:?}: {reason}")]
    InvalidReference {
        /// Plan field holding the reference
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// `minus` adjustment is not an ISO-8601 duration
    #[error("invalid ISO-8601 duration {0:?}")]
    InvalidDuration(String),

    /// A `fail_if` predicate matched the step result
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// A `fail_if` path walks through an absent segment
    #[error("result path {path:?} is missing segment {segment:?}")]
    MissingPath {
        /// Full dotted path
        path: String,
        /// First segment that could not be found
        segment: String,
    },

    /// Attach field cannot be interpreted
    #[error("invalid attach directive {value}: {reason}")]
    InvalidAttach {
        /// The attach field as written in the plan
        value: Value,
        /// Parser diagnostic
        reason: String,
    },

    /// Fan-out list field holds something other than a list
    #[error("fan-out field {field:?} is not a list")]
    NotAList {
        /// Name of the list field
        field: String,
    },

    /// Integration target cannot receive the payload
    #[error("cannot {strategy} into {found}")]
    IncompatibleTarget {
        /// Attach strategy name
        strategy: &'static str,
        /// JSON kind of the target
        found: &'static str,
    },

    /// Child payload cannot be folded with the configured attach directive
    #[error("cannot {operation} a {found} source")]
    IncompatibleSource {
        /// Operation that was attempted
        operation: &'static str,
        /// JSON kind of the source
        found: &'static str,
    },

    /// Error raised by the host's step runner or hooks
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl PlanError {
    /// Create missing field error
    #[inline]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create duplicate binding error
    #[inline]
    pub fn duplicate_binding(binding: impl Into<String>) -> Self {
        Self::DuplicateBinding {
            binding: binding.into(),
        }
    }

    /// Create invalid reference error
    #[inline]
    pub fn invalid_reference(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if error originates from the host rather than the interpreter
    #[inline]
    #[must_use]
    pub fn is_host_error(&self) -> bool {
        matches!(self, Self::Host(_))
    }

    /// Check if error is a structural problem with the plan itself
    #[inline]
    #[must_use]
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::DuplicateBinding { .. }
                | Self::InvalidBinding { .. }
                | Self::InvalidAttach { .. }
                | Self::InvalidReference { .. }
                | Self::InvalidDuration(_)
        )
    }
}

/// Diagnostic for a tripped `fail_if` rule
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {value} <- {predicate}")]
pub struct ValidationFailure {
    /// Dotted path into the step result
    pub path: String,
    /// Value found at the path
    pub value: Value,
    /// Name of the predicate that matched
    pub predicate: String,
}

/// Short name of a JSON value's kind, used in diagnostics
#[must_use]
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_field_display() {
        let err = PlanError::missing_field("attach");
        assert_eq!(
            err.to_string(),
            "plan does not include required field \"attach\""
        );
        assert!(err.is_plan_error());
    }

    #[test]
    fn validation_failure_display() {
        let failure = ValidationFailure {
            path: "content.list".to_string(),
            value: json!([1]),
            predicate: "non_empty".to_string(),
        };
        assert_eq!(failure.to_string(), "content.list: [1] <- non_empty");

        let err = PlanError::from(failure);
        assert!(err.to_string().starts_with("validation failed"));
        assert!(!err.is_plan_error());
    }

    #[test]
    fn host_error_is_transparent() {
        let err = PlanError::from(anyhow::anyhow!("socket closed"));
        assert!(err.is_host_error());
        assert_eq!(err.to_string(), "socket closed");
    }

    #[test]
    fn kind_names() {
        assert_eq!(kind_of(&json!(null)), "null");
        assert_eq!(kind_of(&json!([])), "list");
        assert_eq!(kind_of(&json!({})), "mapping");
    }
}
