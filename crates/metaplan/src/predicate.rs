//! Named predicates over JSON values
//!
//! Predicates drive `fail_if` result validation, the `default_if` escape hatch
//! of the each scope, and list partitioning in the first scope.

use serde_json::Value;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Host-supplied predicate closure
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Predicate over a single JSON value
#[derive(Clone)]
pub enum Predicate {
    /// Non-empty list, mapping or string
    NonEmpty,
    /// Empty list, mapping or string, or null
    Empty,
    /// Value is null
    Null,
    /// Value is neither null nor empty
    Present,
    /// Anything but `null` and `false`
    Truthy,
    /// `null` or `false`
    Falsy,
    /// Host-supplied closure
    Custom(PredicateFn),
}

impl Predicate {
    /// Wrap a host closure
    #[inline]
    pub fn custom(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Predicate matching when `field` of a mapping equals `expected`
    #[must_use]
    pub fn field_eq(field: impl Into<String>, expected: Value) -> Self {
        let field = field.into();
        Self::custom(move |value| value.get(field.as_str()) == Some(&expected))
    }

    /// Evaluate against a value
    #[must_use]
    pub fn test(&self, value: &Value) -> bool {
        match self {
            Self::NonEmpty => !is_empty(value) && !value.is_null(),
            Self::Empty => is_empty(value) || value.is_null(),
            Self::Null => value.is_null(),
            Self::Present => !value.is_null() && !is_empty(value),
            Self::Truthy => !matches!(value, Value::Null | Value::Bool(false)),
            Self::Falsy => matches!(value, Value::Null | Value::Bool(false)),
            Self::Custom(f) => f(value),
        }
    }

    /// Name used in diagnostics
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NonEmpty => "non_empty",
            Self::Empty => "empty",
            Self::Null => "null",
            Self::Present => "present",
            Self::Truthy => "truthy",
            Self::Falsy => "falsy",
            Self::Custom(_) => "<custom>",
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl Debug for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.name())
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing a predicate name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown predicate name: {0:?}")]
pub struct UnknownPredicate(pub String);

impl FromStr for Predicate {
    type Err = UnknownPredicate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "non_empty" | "any?" => Ok(Self::NonEmpty),
            "empty" | "empty?" => Ok(Self::Empty),
            "null" | "nil?" => Ok(Self::Null),
            "present" | "present?" => Ok(Self::Present),
            "truthy" => Ok(Self::Truthy),
            "falsy" => Ok(Self::Falsy),
            other => Err(UnknownPredicate(other.to_string())),
        }
    }
}

impl<F> From<F> for Predicate
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self::custom(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_empty_and_empty() {
        assert!(Predicate::NonEmpty.test(&json!([{"i": 1}])));
        assert!(!Predicate::NonEmpty.test(&json!([])));
        assert!(!Predicate::NonEmpty.test(&json!(null)));
        assert!(Predicate::Empty.test(&json!({})));
        assert!(Predicate::Empty.test(&json!(null)));
        assert!(!Predicate::Empty.test(&json!("x")));
    }

    #[test]
    fn truthiness() {
        assert!(Predicate::Truthy.test(&json!(0)));
        assert!(Predicate::Falsy.test(&json!(false)));
        assert!(!Predicate::Present.test(&json!("")));
        assert!(Predicate::Null.test(&Value::Null));
    }

    #[test]
    fn parse_names() {
        assert_eq!("any?".parse::<Predicate>().unwrap().name(), "non_empty");
        assert_eq!("nil?".parse::<Predicate>().unwrap().name(), "null");
        assert!("bogus".parse::<Predicate>().is_err());
    }

    #[test]
    fn custom_and_field_eq() {
        let p = Predicate::from(|v: &Value| v.as_i64() == Some(3));
        assert!(p.test(&json!(3)));
        assert_eq!(p.to_string(), "<custom>");

        let eq = Predicate::field_eq("a", json!(2));
        assert!(eq.test(&json!({"a": 2})));
        assert!(!eq.test(&json!({"a": 1})));
        assert!(!eq.test(&json!([2])));
    }
}
