//! Attach directives
//!
//! An attach directive tells the integrator how a child plan's result folds
//! into its parent. In a plan it is written as the `attach` field:
//!
//! | Field value | Directive |
//! |---|---|
//! | `false` / `null` | [`AttachMode::Detached`] |
//! | `{"merge": true}` | [`AttachMode::Merge`] |
//! | `{"replace": true}` | [`AttachMode::Replace`] |
//! | `{"to": "key"}` | [`AttachMode::Relocate`] |
//!
//! Any mapping form may also carry `from` (narrow the child content to one
//! key; with `to`, also remove that key from the parent) and `prefix`
//! (prepend text to every child key).

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integration strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachMode {
    /// Result is not folded into any parent (root plans)
    Detached,
    /// Shallow merge, child keys win
    Merge,
    /// Wholesale replacement of the parent payload
    Replace,
    /// Write the child payload under a single new key
    Relocate {
        /// Key receiving the payload
        to: String,
    },
}

impl AttachMode {
    /// Strategy name (for diagnostics)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Detached => "detach",
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::Relocate { .. } => "relocate",
        }
    }
}

/// Typed attach directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attach {
    /// Strategy to apply
    pub mode: AttachMode,
    /// Narrow child content to this key
    pub from: Option<String>,
    /// Prefix for every child key
    pub prefix: Option<String>,
}

/// Wire form of the mapping variant
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttach {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    merge: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
}

impl Attach {
    fn with_mode(mode: AttachMode) -> Self {
        Self {
            mode,
            from: None,
            prefix: None,
        }
    }

    /// Not attached to any parent
    #[inline]
    #[must_use]
    pub fn detached() -> Self {
        Self::with_mode(AttachMode::Detached)
    }

    /// Shallow-merge into the parent
    #[inline]
    #[must_use]
    pub fn merge() -> Self {
        Self::with_mode(AttachMode::Merge)
    }

    /// Replace the parent payload
    #[inline]
    #[must_use]
    pub fn replace() -> Self {
        Self::with_mode(AttachMode::Replace)
    }

    /// Relocate under key `to`
    #[inline]
    #[must_use]
    pub fn relocate(to: impl Into<String>) -> Self {
        Self::with_mode(AttachMode::Relocate { to: to.into() })
    }

    /// Narrow to key `from` (and remove it from the parent when relocating)
    #[inline]
    #[must_use]
    pub fn from_key(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Prefix every child key
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Parse the `attach` field of a plan
    ///
    /// When several strategies are flagged, merge wins over replace, which
    /// wins over relocate.
    ///
    /// # Errors
    /// `InvalidAttach` for `true`, scalars, lists and unknown keys.
    pub fn from_value(value: &Value) -> Result<Self, PlanError> {
        let invalid = |reason: String| PlanError::InvalidAttach {
            value: value.clone(),
            reason,
        };
        let raw = match value {
            Value::Null | Value::Bool(false) => return Ok(Self::detached()),
            Value::Object(_) => RawAttach::deserialize(value).map_err(|e| invalid(e.to_string()))?,
            _ => return Err(invalid("expected false or a mapping".to_string())),
        };

        let mode = if raw.merge {
            AttachMode::Merge
        } else if raw.replace {
            AttachMode::Replace
        } else if let Some(to) = raw.to {
            AttachMode::Relocate { to }
        } else {
            AttachMode::Detached
        };

        Ok(Self {
            mode,
            from: raw.from,
            prefix: raw.prefix,
        })
    }

    /// Render as a plan `attach` field
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut raw = RawAttach {
            from: self.from.clone(),
            prefix: self.prefix.clone(),
            ..RawAttach::default()
        };
        match &self.mode {
            AttachMode::Detached if raw.from.is_none() && raw.prefix.is_none() => {
                return Value::Bool(false)
            }
            AttachMode::Detached => {}
            AttachMode::Merge => raw.merge = true,
            AttachMode::Replace => raw.replace = true,
            AttachMode::Relocate { to } => raw.to = Some(to.clone()),
        }
        serde_json::to_value(raw).unwrap_or(Value::Bool(false))
    }
}

impl From<Attach> for Value {
    fn from(attach: Attach) -> Self {
        attach.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_each_form() {
        assert_eq!(Attach::from_value(&json!(false)).unwrap(), Attach::detached());
        assert_eq!(Attach::from_value(&json!(null)).unwrap(), Attach::detached());
        assert_eq!(
            Attach::from_value(&json!({"merge": true})).unwrap(),
            Attach::merge()
        );
        assert_eq!(
            Attach::from_value(&json!({"replace": true, "prefix": "b_"})).unwrap(),
            Attach::replace().with_prefix("b_")
        );
        assert_eq!(
            Attach::from_value(&json!({"from": "2", "to": "s"})).unwrap(),
            Attach::relocate("s").from_key("2")
        );
    }

    #[test]
    fn merge_takes_precedence() {
        let attach = Attach::from_value(&json!({"replace": true, "merge": true, "to": "x"})).unwrap();
        assert_eq!(attach.mode, AttachMode::Merge);
    }

    #[test]
    fn rejects_bad_forms() {
        for bad in [json!(true), json!("merge"), json!([1]), json!({"into": "x"})] {
            let err = Attach::from_value(&bad).unwrap_err();
            assert!(matches!(err, PlanError::InvalidAttach { .. }), "{bad}");
        }
    }

    #[test]
    fn renders_field_value() {
        assert_eq!(Attach::detached().to_value(), json!(false));
        assert_eq!(Attach::merge().to_value(), json!({"merge": true}));
        assert_eq!(
            Attach::relocate("t").from_key("list").to_value(),
            json!({"to": "t", "from": "list"})
        );
        let attach = Attach::replace().with_prefix("b_");
        assert_eq!(Attach::from_value(&attach.to_value()).unwrap(), attach);
    }
}
