//! Result integration
//!
//! Folds a child step's result into a parent target under an [`Attach`]
//! directive. A target is either a whole result (it carries a `content`
//! key, the payload lands inside it) or a bare mapping such as a list
//! element in an each scope (the payload lands on the mapping itself).
//!
//! # Strategies
//! - Merge: shallow merge, child keys win; a null payload merges nothing
//! - Replace: wholesale replacement; a null payload nulls a `content`
//!   wrapper but clears a bare target to an empty mapping
//! - Relocate: write the payload under key `to`, first removing key `from`
//!
//! The payload is computed and checked against the target before anything is
//! written, so a failed integration leaves the target untouched.

use crate::attach::{Attach, AttachMode};
use crate::error::{kind_of, PlanError};
use crate::types::{Fields, StepResult, CONTENT_KEY, METADATA_KEY};
use chrono::DateTime;
use serde_json::{Number, Value};

/// Metadata key carrying the last-updated timestamp
pub const UPDATED_AT_KEY: &str = "updated_at";

/// Compute the payload a child contributes
///
/// Takes the child's `content`, narrows it to `attach.from` and prefixes its
/// keys with `attach.prefix`.
///
/// # Errors
/// `IncompatibleSource` when narrowing or prefixing a non-mapping payload.
pub fn extract_payload(attach: &Attach, source: &StepResult) -> Result<Value, PlanError> {
    let mut payload = source.content().clone();

    if let Some(from) = &attach.from {
        payload = match payload {
            Value::Null => Value::Null,
            Value::Object(mut map) => map.remove(from).unwrap_or(Value::Null),
            other => {
                return Err(PlanError::IncompatibleSource {
                    operation: "narrow",
                    found: kind_of(&other),
                })
            }
        };
    }

    if let Some(prefix) = &attach.prefix {
        payload = match payload {
            Value::Null => Value::Null,
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (format!("{prefix}{k}"), v))
                    .collect(),
            ),
            other => {
                return Err(PlanError::IncompatibleSource {
                    operation: "prefix",
                    found: kind_of(&other),
                })
            }
        };
    }

    Ok(payload)
}

/// Check that `payload` can land on `target` under `mode`
///
/// # Errors
/// `IncompatibleTarget` / `IncompatibleSource` describing the mismatch.
pub fn check_compatible(mode: &AttachMode, target: &Fields, payload: &Value) -> Result<(), PlanError> {
    let wrapped = target.get(CONTENT_KEY);
    let target_ok = match wrapped {
        Some(content) => matches!(content, Value::Null | Value::Object(_)),
        None => true,
    };
    let replacing_wrapped = matches!(mode, AttachMode::Replace) && wrapped.is_some();

    if !target_ok && !replacing_wrapped && !matches!(mode, AttachMode::Detached) {
        return Err(PlanError::IncompatibleTarget {
            strategy: mode.name(),
            found: wrapped.map_or("mapping", kind_of),
        });
    }

    let source_ok = match mode {
        AttachMode::Merge => matches!(payload, Value::Null | Value::Object(_)),
        AttachMode::Replace if !replacing_wrapped => {
            matches!(payload, Value::Null | Value::Object(_))
        }
        _ => true,
    };
    if !source_ok {
        return Err(PlanError::IncompatibleSource {
            operation: mode.name(),
            found: kind_of(payload),
        });
    }
    Ok(())
}

/// Land a pre-checked payload on the target
pub(crate) fn apply(attach: &Attach, target: &mut Fields, payload: Value) -> Result<(), PlanError> {
    check_compatible(&attach.mode, target, &payload)?;
    tracing::trace!("Attaching child payload via {}", attach.mode.name());

    match &attach.mode {
        AttachMode::Detached => {}
        AttachMode::Merge => {
            let into = payload_slot(target);
            if let Value::Object(source) = payload {
                for (k, v) in source {
                    into.insert(k, v);
                }
            }
        }
        AttachMode::Replace => match target.get_mut(CONTENT_KEY) {
            Some(content) => *content = payload,
            None => {
                target.clear();
                if let Value::Object(source) = payload {
                    target.extend(source);
                }
            }
        },
        AttachMode::Relocate { to } => {
            let into = payload_slot(target);
            if let Some(from) = &attach.from {
                into.shift_remove(from);
            }
            into.insert(to.clone(), payload);
        }
    }
    Ok(())
}

/// Mapping that receives the payload: the `content` wrapper if present
/// (initialised to an empty mapping when null), otherwise the target itself
fn payload_slot(target: &mut Fields) -> &mut Fields {
    if target.contains_key(CONTENT_KEY) {
        let content = target
            .entry(CONTENT_KEY)
            .or_insert(Value::Null);
        if content.is_null() {
            *content = Value::Object(Fields::new());
        }
        match content {
            Value::Object(map) => map,
            _ => unreachable!("content checked to be a mapping before attaching"),
        }
    } else {
        target
    }
}

/// Keep the newest `metadata.updated_at` on the target
///
/// Only applies when both sides carry parseable RFC 3339 timestamps.
pub fn propagate_updated_at(target: &mut Fields, source: &StepResult) {
    let Some(source_at) = source
        .metadata()
        .and_then(|meta| meta.get(UPDATED_AT_KEY))
        .and_then(Value::as_str)
    else {
        return;
    };
    let Some(target_meta) = target.get_mut(METADATA_KEY).and_then(Value::as_object_mut) else {
        return;
    };
    let Some(target_at) = target_meta.get(UPDATED_AT_KEY).and_then(Value::as_str) else {
        return;
    };

    match (
        DateTime::parse_from_rfc3339(source_at),
        DateTime::parse_from_rfc3339(target_at),
    ) {
        (Ok(newer), Ok(older)) if newer > older => {
            target_meta.insert(UPDATED_AT_KEY.to_string(), Value::String(source_at.to_string()));
        }
        _ => {}
    }
}

/// Add a child's effort counters to the parent result's metadata
///
/// Counters absent on either side count as zero; nothing happens when the
/// parent carries no metadata mapping.
pub fn add_effort(parent: &mut StepResult, child: &StepResult, counters: &[String]) {
    let child_meta = child.metadata();
    let Some(parent_meta) = parent.metadata_mut() else {
        return;
    };

    for counter in counters {
        let child_count = child_meta.and_then(|meta| meta.get(counter));
        let parent_count = parent_meta.get(counter);
        if child_count.is_none() && parent_count.is_none() {
            continue;
        }
        let sum = add_counts(parent_count, child_count);
        parent_meta.insert(counter.clone(), sum);
    }
}

fn add_counts(a: Option<&Value>, b: Option<&Value>) -> Value {
    let int = |v: Option<&Value>| v.map_or(Some(0), Value::as_i64);
    if let (Some(x), Some(y)) = (int(a), int(b)) {
        return Value::Number(Number::from(x.saturating_add(y)));
    }
    let float = |v: Option<&Value>| v.and_then(Value::as_f64).unwrap_or(0.0);
    Number::from_f64(float(a) + float(b)).map_or(Value::Null, Value::Number)
}

/// Zero the page counters present in a result's metadata
pub fn skip_page_counts(result: &mut StepResult, fields: &[String]) {
    let Some(meta) = result.metadata_mut() else {
        return;
    };
    for field in fields {
        if let Some(count) = meta.get_mut(field) {
            *count = Value::from(0);
        }
    }
}
