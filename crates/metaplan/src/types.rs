//! Core value types
//!
//! - [`State`]: binding name → prior content, scoped to one recursion path
//! - [`Step`]: resolved, concrete form of a plan node
//! - [`StepResult`]: `content` plus optional `metadata` produced by a step

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// Ordered field map shared by plans, steps and results
pub type Fields = Map<String, Value>;

/// Key holding the domain payload of a result
pub const CONTENT_KEY: &str = "content";

/// Key holding run-level counters of a result
pub const METADATA_KEY: &str = "metadata";

pub(crate) static NULL: Value = Value::Null;

/// Accumulated bindings along one root-to-leaf path
///
/// Backed by a persistent map: [`State::bind`] returns a new state that shares
/// structure with its parent, so sibling branches never observe each other's
/// bindings and handing a state to a child costs O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State(im::HashMap<String, Value>);

impl State {
    /// Create empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new state extended by one binding
    #[inline]
    #[must_use]
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Self {
        Self(self.0.update(name.into(), value))
    }

    /// Look up a binding
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Check whether a name is already bound
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of bindings (equals the recursion depth below the caller's seed)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no names are bound
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over bindings in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Resolved step handed to the step runner
///
/// Dereferences to its ordered field map so hooks can read and rewrite
/// fields directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(Fields);

impl Step {
    /// Create step from resolved fields
    #[inline]
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    /// Binding name of the step (`as` field)
    #[inline]
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        self.0.get("as").and_then(Value::as_str)
    }

    /// Consume into the underlying field map
    #[inline]
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.0
    }
}

impl Deref for Step {
    type Target = Fields;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Step {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Output of executing one step
///
/// A mapping with a `content` key (null, mapping or list) and an optional
/// `metadata` mapping of counters such as `page_count_delivered` and an
/// `updated_at` timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResult(Fields);

impl StepResult {
    /// Create result wrapping the given content
    #[must_use]
    pub fn new(content: Value) -> Self {
        let mut fields = Fields::new();
        fields.insert(CONTENT_KEY.to_string(), content);
        Self(fields)
    }

    /// Create result with null content
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Value::Null)
    }

    /// Create result from a raw field map
    #[inline]
    #[must_use]
    pub fn from_fields(fields: Fields) -> Self {
        Self(fields)
    }

    /// Attach metadata, replacing any existing mapping
    #[must_use]
    pub fn with_metadata(mut self, metadata: Fields) -> Self {
        self.0
            .insert(METADATA_KEY.to_string(), Value::Object(metadata));
        self
    }

    /// Domain payload; null when absent
    #[inline]
    #[must_use]
    pub fn content(&self) -> &Value {
        self.0.get(CONTENT_KEY).unwrap_or(&NULL)
    }

    /// Mutable domain payload, inserting null when absent
    #[inline]
    pub fn content_mut(&mut self) -> &mut Value {
        self.0.entry(CONTENT_KEY).or_insert(Value::Null)
    }

    /// Run-level counters, if the result carries a metadata mapping
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> Option<&Fields> {
        self.0.get(METADATA_KEY).and_then(Value::as_object)
    }

    /// Mutable run-level counters
    #[inline]
    pub fn metadata_mut(&mut self) -> Option<&mut Fields> {
        self.0.get_mut(METADATA_KEY).and_then(Value::as_object_mut)
    }

    /// Borrow the underlying field map
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.0
    }

    /// Mutably borrow the underlying field map
    #[inline]
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.0
    }

    /// Render as a JSON value
    #[inline]
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consume into a JSON value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Default for StepResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<StepResult> for Value {
    fn from(result: StepResult) -> Self {
        result.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_bind_does_not_leak_to_parent() {
        let root = State::new().bind("cake", json!({"c": 1}));
        let left = root.bind("topping", json!(1));
        let right = root.bind("chocolate", json!(2));

        assert!(left.contains("topping"));
        assert!(!left.contains("chocolate"));
        assert!(!right.contains("topping"));
        assert_eq!(root.len(), 1);
        assert_eq!(left.get("cake"), Some(&json!({"c": 1})));
    }

    #[test]
    fn state_from_iter() {
        let state: State = [("a", json!(1)), ("b", json!(2))].into_iter().collect();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("b"), Some(&json!(2)));
    }

    #[test]
    fn step_binding() {
        let mut fields = Fields::new();
        fields.insert("as".into(), json!("cake"));
        let mut step = Step::new(fields);
        assert_eq!(step.binding(), Some("cake"));

        step.insert("value".into(), json!(3));
        assert_eq!(step.get("value"), Some(&json!(3)));
    }

    #[test]
    fn step_result_content_and_metadata() {
        let mut meta = Fields::new();
        meta.insert("request_count".into(), json!(1));
        let mut result = StepResult::new(json!({"a": 1})).with_metadata(meta);

        assert_eq!(result.content(), &json!({"a": 1}));
        assert_eq!(result.metadata().unwrap()["request_count"], json!(1));

        *result.content_mut() = Value::Null;
        assert_eq!(
            result.into_value(),
            json!({"content": null, "metadata": {"request_count": 1}})
        );
    }

    #[test]
    fn step_result_without_content_reads_null() {
        let result = StepResult::from_fields(Fields::new());
        assert!(result.content().is_null());
        assert!(result.metadata().is_none());
    }

    #[test]
    fn step_result_serializes_transparently() {
        let result = StepResult::new(json!([1, 2]));
        let text = serde_json::to_string(&result).unwrap();
        assert_eq!(text, r#"{"content":[1,2]}"#);
        let back: StepResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
    }
}
