//! Partition/fallback selection for the first scope

use crate::predicate::Predicate;
use serde_json::Value;

/// Split a candidate list into `(primary, residual)`
///
/// With a predicate, primary holds the matching elements and residual the
/// rest, both in list order. Without one, the whole list is primary.
#[must_use]
pub fn partition(predicate: Option<&Predicate>, items: Vec<Value>) -> (Vec<Value>, Vec<Value>) {
    match predicate {
        Some(predicate) => items.into_iter().partition(|item| predicate.test(item)),
        None => (items, Vec::new()),
    }
}

/// Branch chosen by the first scope
#[derive(Debug, Clone, PartialEq)]
pub enum FirstChoice {
    /// Run the child plan bound to this element
    Primary(Value),
    /// Run the fallback plan bound to the whole parent result
    Fallback,
    /// Run nothing; integrate a null result with the child's directive
    Nothing,
}

/// Pick the branch for a first scope
#[must_use]
pub fn select_first(
    predicate: Option<&Predicate>,
    items: Vec<Value>,
    has_fallback: bool,
) -> FirstChoice {
    let (primary, residual) = partition(predicate, items);
    if let Some(first) = primary.into_iter().next() {
        FirstChoice::Primary(first)
    } else if !residual.is_empty() && has_fallback {
        FirstChoice::Fallback
    } else {
        FirstChoice::Nothing
    }
}
