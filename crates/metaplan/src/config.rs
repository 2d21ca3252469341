//! Interpreter settings
//!
//! The serializable part of an interpreter's configuration. Hooks live in
//! [`Hooks`](crate::Hooks) since closures cannot be deserialized.
//!
//! ```toml
//! required_fields = ["as", "attach", "topic"]
//! effort_counters = ["request_count"]
//! ```

use crate::error::PlanError;
use serde::{Deserialize, Serialize};

/// Serializable interpreter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Fields every plan node must carry
    pub required_fields: Vec<String>,
    /// Metadata counters summed from children into parents
    pub effort_counters: Vec<String>,
    /// Metadata counters zeroed by `skip_page_count`
    pub page_count_fields: Vec<String>,
}

impl InterpreterSettings {
    /// Create default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With required fields
    #[must_use]
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// With effort counters
    #[must_use]
    pub fn with_effort_counters<I, S>(mut self, counters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.effort_counters = counters.into_iter().map(Into::into).collect();
        self
    }

    /// Parse settings from TOML; absent keys keep their defaults
    ///
    /// # Errors
    /// Host error wrapping the TOML diagnostic.
    pub fn from_toml_str(text: &str) -> Result<Self, PlanError> {
        toml::from_str(text).map_err(|e| PlanError::Host(e.into()))
    }

    /// Parse settings from JSON; absent keys keep their defaults
    ///
    /// # Errors
    /// Host error wrapping the JSON diagnostic.
    pub fn from_json_str(text: &str) -> Result<Self, PlanError> {
        serde_json::from_str(text).map_err(|e| PlanError::Host(e.into()))
    }
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        let names = |list: &[&str]| -> Vec<String> { list.iter().map(ToString::to_string).collect() };
        Self {
            required_fields: names(&["as", "attach"]),
            effort_counters: names(&[
                "page_count_delivered",
                "page_count_live",
                "page_count_from_cache",
                "request_count",
            ]),
            page_count_fields: names(&[
                "page_count_delivered",
                "page_count_live",
                "page_count_from_cache",
            ]),
        }
    }
}
