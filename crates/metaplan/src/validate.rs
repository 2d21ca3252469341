//! Plan and result validation
//!
//! - [`validate_plan`]: required fields present, binding name not yet bound
//! - [`validate_result`]: no `fail_if` rule matches the step result
//!
//! Both are pure checks run before anything is mutated.

use crate::error::{PlanError, ValidationFailure};
use crate::plan::{FailRule, Plan};
use crate::types::{State, StepResult};
use serde_json::Value;

/// Check a plan node against the current state
///
/// # Errors
/// - `MissingField` naming the first absent required field
/// - `InvalidBinding` when `as` is not a string
/// - `DuplicateBinding` when `as` is already bound on this path
pub fn validate_plan(
    plan: &Plan,
    state: &State,
    required_fields: &[String],
) -> Result<(), PlanError> {
    if let Some(missing) = required_fields
        .iter()
        .find(|field| plan.get(field).is_none())
    {
        return Err(PlanError::missing_field(missing.as_str()));
    }

    let binding = plan.binding()?;
    if state.contains(binding) {
        return Err(PlanError::duplicate_binding(binding));
    }
    Ok(())
}

/// Evaluate `fail_if` rules against a step result
///
/// Rules are checked in declared order; the first matching rule fails the run.
///
/// # Errors
/// - `MissingPath` when a rule's path walks through an absent segment
/// - `Validation` when a predicate matches
pub fn validate_result(rules: &[FailRule], result: &StepResult) -> Result<(), PlanError> {
    let root = result.fields();
    for rule in rules {
        let value = lookup_path(root, &rule.path)?;
        if rule.predicate.test(value) {
            tracing::warn!("fail_if rule {} <- {} matched", rule.path, rule.predicate);
            return Err(ValidationFailure {
                path: rule.path.clone(),
                value: value.clone(),
                predicate: rule.predicate.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Walk a dotted path through nested mappings
///
/// Numeric segments index into lists. An absent segment is an error, never a
/// silent null.
///
/// # Errors
/// `MissingPath` naming the first segment that cannot be followed.
pub fn lookup_path<'a>(
    root: &'a serde_json::Map<String, Value>,
    path: &str,
) -> Result<&'a Value, PlanError> {
    let missing = |segment: &str| PlanError::MissingPath {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut current = root.get(first).ok_or_else(|| missing(first))?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| missing(segment))?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;
    use serde_json::json;

    fn required() -> Vec<String> {
        vec!["as".to_string(), "attach".to_string()]
    }

    #[test]
    fn missing_required_field() {
        let plan = Plan::new("cake");
        let err = validate_plan(&plan, &State::new(), &required()).unwrap_err();
        assert!(matches!(err, PlanError::MissingField { ref field } if field == "attach"));
    }

    #[test]
    fn custom_required_fields() {
        let plan = Plan::new("cake").field("attach", false);
        let fields = vec!["as".to_string(), "attach".to_string(), "value".to_string()];
        assert!(validate_plan(&plan, &State::new(), &fields).is_err());
        assert!(validate_plan(&plan.field("value", "moo"), &State::new(), &fields).is_ok());
    }

    #[test]
    fn duplicate_binding() {
        let plan = Plan::new("cake").field("attach", false);
        let state = State::new().bind("cake", json!({}));
        let err = validate_plan(&plan, &state, &required()).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateBinding { ref binding } if binding == "cake"));
    }

    #[test]
    fn lookup_walks_mappings_and_lists() {
        let result = StepResult::new(json!({"list": [{"i": 1}, {"i": 2}]}));
        let root = result.fields();
        assert_eq!(lookup_path(root, "content.list.1.i").unwrap(), &json!(2));

        let err = lookup_path(root, "content.items").unwrap_err();
        assert!(matches!(err, PlanError::MissingPath { ref segment, .. } if segment == "items"));

        assert!(lookup_path(root, "metadata").is_err());
        assert!(lookup_path(root, "content.list.9").is_err());
    }

    #[test]
    fn fail_if_matching_predicate() {
        let result = StepResult::new(json!({"list": [{"i": 1}, {"i": 2}]}));
        let plan = Plan::new("cake").fail_if("content.list", Predicate::NonEmpty);

        let err = validate_result(plan.fail_rules(), &result).unwrap_err();
        match err {
            PlanError::Validation(failure) => {
                assert_eq!(failure.path, "content.list");
                assert_eq!(failure.predicate, "non_empty");
                assert_eq!(failure.value, json!([{"i": 1}, {"i": 2}]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fail_if_not_matching() {
        let result = StepResult::new(json!({"list": [{"i": 1}, {"i": 2}]}));
        let plan = Plan::new("cake").fail_if(
            "content.list",
            Predicate::custom(|v| {
                v.as_array()
                    .is_some_and(|items| items.iter().any(|e| e["i"] == json!(3)))
            }),
        );
        assert!(validate_result(plan.fail_rules(), &result).is_ok());
    }
}
