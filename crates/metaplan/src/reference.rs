//! Reference resolution
//!
//! A plan field whose value is a mapping with a `ref` key is a reference:
//!
//! ```json
//! {"ref": "cake.updated_at", "minus": "P30D"}
//! ```
//!
//! The container (`cake`) is looked up first through the host's
//! `unpack_ref_container` hook, then in [`State`]. The attribute
//! (`updated_at`) must exist on the container. Only the first two
//! dot-separated segments count, so `cake.updated_at.day` reads
//! `cake.updated_at`. An optional `minus` duration is subtracted from the
//! resolved value.

use crate::duration::IsoDuration;
use crate::error::PlanError;
use crate::hooks::UnpackRefContainerFn;
use crate::types::{Fields, State};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// Key marking a field value as a reference
pub const REF_KEY: &str = "ref";

/// Key carrying the optional duration adjustment
pub const MINUS_KEY: &str = "minus";

/// Parsed reference descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    container: String,
    attribute: Option<String>,
    minus: Option<String>,
}

impl Reference {
    /// Create reference to `container.attribute`
    #[inline]
    #[must_use]
    pub fn new(container: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            attribute: Some(attribute.into()),
            minus: None,
        }
    }

    /// Subtract an ISO-8601 duration from the resolved value
    #[inline]
    #[must_use]
    pub fn minus(mut self, duration: impl Into<String>) -> Self {
        self.minus = Some(duration.into());
        self
    }

    /// Container name
    #[inline]
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Attribute name, `None` for a bare container reference
    #[inline]
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Parse a field value into a reference
    ///
    /// Returns `Ok(None)` when the value is not reference-shaped.
    ///
    /// # Errors
    /// `InvalidReference` when `ref` is not a non-empty string or `minus` is
    /// not a string. A missing attribute is reported at resolution time.
    pub fn parse(field: &str, value: &Value) -> Result<Option<Self>, PlanError> {
        let Some(descriptor) = value.as_object() else {
            return Ok(None);
        };
        let Some(target) = descriptor.get(REF_KEY) else {
            return Ok(None);
        };
        let target = target
            .as_str()
            .ok_or_else(|| PlanError::invalid_reference(field, "ref must be a string"))?;

        if target.is_empty() {
            return Err(PlanError::invalid_reference(field, "ref must not be empty"));
        }
        let mut segments = target.split('.');
        let container = segments.next().unwrap_or_default();
        let attribute = segments.next();

        let minus = match descriptor.get(MINUS_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(d)) => Some(d.clone()),
            Some(_) => {
                return Err(PlanError::invalid_reference(
                    field,
                    "minus must be an ISO-8601 duration string",
                ))
            }
        };

        Ok(Some(Self {
            container: container.to_string(),
            attribute: attribute.map(str::to_string),
            minus,
        }))
    }

    /// Render as a plan field value
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut descriptor = Fields::new();
        descriptor.insert(REF_KEY.to_string(), Value::String(self.to_string()));
        if let Some(minus) = &self.minus {
            descriptor.insert(MINUS_KEY.to_string(), Value::String(minus.clone()));
        }
        Value::Object(descriptor)
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}.{}", self.container, attribute),
            None => f.write_str(&self.container),
        }
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        reference.to_value()
    }
}

/// Check if a field is structural and never interpolated
///
/// Binding, attach and page-count bookkeeping fields, fan-out directives,
/// partition/fallback/default rules and any `*_if` predicate field pass
/// through untouched.
#[must_use]
pub fn is_structural_field(name: &str) -> bool {
    matches!(
        name,
        "as" | "attach" | "skip_page_count" | "partition" | "fallback" | "default"
    ) || name.starts_with("for_")
        || name.ends_with("_if")
}

/// Resolves references against host containers and state
pub(crate) struct Resolver<'a> {
    state: &'a State,
    args: &'a [Value],
    unpack: Option<&'a UnpackRefContainerFn>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        state: &'a State,
        args: &'a [Value],
        unpack: Option<&'a UnpackRefContainerFn>,
    ) -> Self {
        Self {
            state,
            args,
            unpack,
        }
    }

    /// Resolve one plan field to its literal value
    pub(crate) fn resolve_field(&self, name: &str, value: &Value) -> Result<Value, PlanError> {
        if is_structural_field(name) {
            return Ok(value.clone());
        }
        match Reference::parse(name, value)? {
            Some(reference) => self.resolve(&reference),
            None => Ok(value.clone()),
        }
    }

    /// Resolve a reference and apply its adjustment
    pub(crate) fn resolve(&self, reference: &Reference) -> Result<Value, PlanError> {
        let host_container = match self.unpack {
            Some(unpack) => unpack(reference.container(), self.args)?,
            None => None,
        };
        let container = match host_container.as_ref() {
            Some(found) => found,
            None => self
                .state
                .get(reference.container())
                .ok_or_else(|| PlanError::UnknownContainer {
                    container: reference.container().to_string(),
                })?,
        };

        let resolved = reference
            .attribute()
            .and_then(|attribute| container.as_object()?.get(attribute))
            .ok_or_else(|| PlanError::UnknownAttribute {
                container: reference.container().to_string(),
                attribute: reference.attribute().unwrap_or_default().to_string(),
                available: container
                    .as_object()
                    .map(|fields| fields.keys().cloned().collect())
                    .unwrap_or_default(),
            })?
            .clone();

        tracing::trace!("Resolved reference {} -> {}", reference, resolved);

        match &reference.minus {
            Some(minus) => Ok(minus.parse::<IsoDuration>()?.subtract_from(resolved)),
            None => Ok(resolved),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> State {
        State::new().bind("cake", json!({"c": 1, "at": "2024-01-31T00:00:00Z", "n": null}))
    }

    #[test]
    fn parse_reference_shapes() {
        assert_eq!(Reference::parse("v", &json!(3)).unwrap(), None);
        assert_eq!(Reference::parse("v", &json!({"a": 1})).unwrap(), None);
        assert_eq!(
            Reference::parse("v", &json!({"ref": "cake.c"})).unwrap(),
            Some(Reference::new("cake", "c"))
        );
        assert_eq!(
            Reference::parse("v", &json!({"ref": "cake.c.d"})).unwrap(),
            Some(Reference::new("cake", "c"))
        );
        let bare = Reference::parse("v", &json!({"ref": "cake"})).unwrap().unwrap();
        assert_eq!((bare.container(), bare.attribute()), ("cake", None));
        assert_eq!(bare.to_value(), json!({"ref": "cake"}));
        assert!(Reference::parse("v", &json!({"ref": ""})).is_err());
        assert!(Reference::parse("v", &json!({"ref": 5})).is_err());
    }

    #[test]
    fn reference_round_trips_through_value() {
        let r = Reference::new("cake", "at").minus("P1D");
        assert_eq!(r.to_value(), json!({"ref": "cake.at", "minus": "P1D"}));
        assert_eq!(Reference::parse("v", &r.to_value()).unwrap(), Some(r));
    }

    #[test]
    fn resolves_from_state() {
        let state = state();
        let resolver = Resolver::new(&state, &[], None);
        let value = resolver
            .resolve_field("value", &json!({"ref": "cake.c"}))
            .unwrap();
        assert_eq!(value, json!(1));

        let null = resolver.resolve_field("value", &json!({"ref": "cake.n"})).unwrap();
        assert_eq!(null, json!(null));
    }

    #[test]
    fn unknown_container_and_attribute() {
        let state = state();
        let resolver = Resolver::new(&state, &[], None);

        let err = resolver
            .resolve_field("value", &json!({"ref": "pie.c"}))
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownContainer { ref container } if container == "pie"));

        let err = resolver
            .resolve_field("value", &json!({"ref": "cake.x"}))
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownAttribute { ref attribute, .. } if attribute == "x"));
    }

    #[test]
    fn dotless_references_fail_at_lookup() {
        let state = State::new().bind("cake", json!({"c": 1}));
        let resolver = Resolver::new(&state, &[], None);

        let err = resolver
            .resolve_field("value", &json!({"ref": "pie"}))
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownContainer { ref container } if container == "pie"));

        let err = resolver
            .resolve_field("value", &json!({"ref": "cake"}))
            .unwrap_err();
        match err {
            PlanError::UnknownAttribute {
                container,
                attribute,
                available,
            } => {
                assert_eq!(container, "cake");
                assert_eq!(attribute, "");
                assert_eq!(available, ["c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extra_segments_are_ignored() {
        let state = State::new().bind("cake", json!({"c": 1}));
        let resolver = Resolver::new(&state, &[], None);
        let value = resolver
            .resolve_field("value", &json!({"ref": "cake.c.d"}))
            .unwrap();
        assert_eq!(value, json!(1));
    }

    #[test]
    fn host_container_takes_precedence() {
        let state = state();
        let unpack: UnpackRefContainerFn = Arc::new(|name: &str, args: &[Value]| {
            assert_eq!(args, &[json!("blu")]);
            Ok::<_, anyhow::Error>((name == "cake").then(|| json!({"c": 5})))
        });
        let args = [json!("blu")];
        let resolver = Resolver::new(&state, &args, Some(&unpack));
        assert_eq!(resolver.resolve(&Reference::new("cake", "c")).unwrap(), json!(5));
    }

    #[test]
    fn host_miss_falls_back_to_state() {
        let state = state();
        let unpack: UnpackRefContainerFn = Arc::new(|_: &str, _: &[Value]| Ok::<_, anyhow::Error>(None));
        let resolver = Resolver::new(&state, &[], Some(&unpack));
        assert_eq!(resolver.resolve(&Reference::new("cake", "c")).unwrap(), json!(1));
    }

    #[test]
    fn applies_minus_adjustment() {
        let state = state();
        let resolver = Resolver::new(&state, &[], None);
        let value = resolver
            .resolve(&Reference::new("cake", "at").minus("P30D"))
            .unwrap();
        assert_eq!(value, json!("2024-01-01T00:00:00Z"));

        let err = resolver
            .resolve(&Reference::new("cake", "c").minus("thirty days"))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidDuration(_)));
    }

    #[test]
    fn structural_fields_pass_through() {
        let state = State::new();
        let resolver = Resolver::new(&state, &[], None);
        let descriptor = json!({"ref": "missing.x"});
        for name in ["as", "attach", "stop_if", "for_each_list", "skip_page_count"] {
            assert_eq!(resolver.resolve_field(name, &descriptor).unwrap(), descriptor);
        }
    }
}
