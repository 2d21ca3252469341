//! Plan nodes
//!
//! A [`Plan`] describes one step (its ordered plain fields, including the
//! `as` binding name and the `attach` directive) plus the child plans it fans
//! out to. Fan-out is an explicit ordered list of [`FanOut`] entries rather
//! than specially named fields, so declared order is preserved without any
//! string parsing.
//!
//! # Example
//!
//! ```
//! use metaplan::{Attach, Plan, Reference};
//!
//! let plan = Plan::new("cake")
//!     .attach(Attach::detached())
//!     .for_this(
//!         Plan::new("topping")
//!             .attach(Attach::relocate("t"))
//!             .field("value", Reference::new("cake", "c")),
//!     );
//!
//! assert_eq!(plan.children().len(), 1);
//! ```

use crate::attach::Attach;
use crate::error::PlanError;
use crate::hooks::DefaultFn;
use crate::predicate::Predicate;
use crate::types::{Fields, StepResult, NULL};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Field holding the binding name
pub const AS_FIELD: &str = "as";

/// Field holding the attach directive
pub const ATTACH_FIELD: &str = "attach";

/// How many times, and against what data, a child plan recurses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Once, bound to the parent's content
    This,
    /// Once, bound to the first primary element of a list field
    First(String),
    /// Once per element of a list field, integrated into that element
    Each(String),
}

impl Scope {
    /// List field targeted by the scope, if any
    #[inline]
    #[must_use]
    pub fn list_field(&self) -> Option<&str> {
        match self {
            Self::This => None,
            Self::First(field) | Self::Each(field) => Some(field),
        }
    }

    /// Scope qualifier (for diagnostics)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::This => "this",
            Self::First(_) => "first",
            Self::Each(_) => "each",
        }
    }
}

/// Child plan directive
#[derive(Debug, Clone)]
pub struct FanOut {
    /// Fan-out scope
    pub scope: Scope,
    /// Plan run for each recursion
    pub plan: Plan,
}

/// A `fail_if` rule
#[derive(Debug, Clone)]
pub struct FailRule {
    /// Dotted path into the step result (e.g. `content.list`)
    pub path: String,
    /// Run fails when this matches the value at `path`
    pub predicate: Predicate,
}

/// Declarative description of one step and its nested sub-plans
///
/// Plans are immutable inputs; the interpreter only ever reads them.
#[derive(Clone, Default)]
pub struct Plan {
    fields: Fields,
    children: Vec<FanOut>,
    partition: Option<Predicate>,
    fallback: Option<Box<Plan>>,
    default_if: Option<Predicate>,
    default: Option<Value>,
    default_with: Option<DefaultFn>,
    fail_if: Vec<FailRule>,
    skip_page_count: bool,
}

impl Plan {
    /// Create plan binding its result as `binding`
    #[must_use]
    pub fn new(binding: impl Into<String>) -> Self {
        Self::empty().field(AS_FIELD, Value::String(binding.into()))
    }

    /// Create plan without any fields
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create plan from raw fields
    #[inline]
    #[must_use]
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Set a plain field; later calls overwrite earlier values in place
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the attach directive
    #[inline]
    #[must_use]
    pub fn attach(self, attach: Attach) -> Self {
        self.field(ATTACH_FIELD, attach.to_value())
    }

    /// Add a child plan run once against this plan's content
    #[inline]
    #[must_use]
    pub fn for_this(self, plan: Plan) -> Self {
        self.fan_out(Scope::This, plan)
    }

    /// Add a child plan run against the first element of `list`
    #[inline]
    #[must_use]
    pub fn for_first(self, list: impl Into<String>, plan: Plan) -> Self {
        self.fan_out(Scope::First(list.into()), plan)
    }

    /// Add a child plan run against every element of `list`
    #[inline]
    #[must_use]
    pub fn for_each(self, list: impl Into<String>, plan: Plan) -> Self {
        self.fan_out(Scope::Each(list.into()), plan)
    }

    /// Add a child plan with an explicit scope
    #[must_use]
    pub fn fan_out(mut self, scope: Scope, plan: Plan) -> Self {
        self.children.push(FanOut { scope, plan });
        self
    }

    /// Split first-scope lists into matching (primary) and residual elements
    #[inline]
    #[must_use]
    pub fn partition(mut self, predicate: impl Into<Predicate>) -> Self {
        self.partition = Some(predicate.into());
        self
    }

    /// Plan run against the whole result when only residual elements remain
    #[inline]
    #[must_use]
    pub fn fallback(mut self, plan: Plan) -> Self {
        self.fallback = Some(Box::new(plan));
        self
    }

    /// In each scopes, use `default` as content for elements matching `predicate`
    #[inline]
    #[must_use]
    pub fn default_if(mut self, predicate: impl Into<Predicate>, default: Value) -> Self {
        self.default_if = Some(predicate.into());
        self.default = Some(default);
        self
    }

    /// Compute a result instead of running this plan when the hook returns `Some`
    #[inline]
    #[must_use]
    pub fn default_with(
        mut self,
        f: impl Fn(&Plan, &Value, &[Value]) -> anyhow::Result<Option<StepResult>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.default_with = Some(Arc::new(f));
        self
    }

    /// Fail the run when `predicate` matches the result value at `path`
    #[inline]
    #[must_use]
    pub fn fail_if(mut self, path: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        self.fail_if.push(FailRule {
            path: path.into(),
            predicate: predicate.into(),
        });
        self
    }

    /// Zero this step's own page counters once it descends (or at the leaf)
    #[inline]
    #[must_use]
    pub fn skip_page_count(mut self) -> Self {
        self.skip_page_count = true;
        self
    }

    /// Plain fields in declared order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Look up a plain field
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Binding name
    ///
    /// # Errors
    /// `MissingField` when `as` is absent, `InvalidBinding` when it is not a
    /// string.
    pub fn binding(&self) -> Result<&str, PlanError> {
        match self.fields.get(AS_FIELD) {
            Some(Value::String(name)) => Ok(name.as_str()),
            Some(other) => Err(PlanError::InvalidBinding {
                value: other.clone(),
            }),
            None => Err(PlanError::missing_field(AS_FIELD)),
        }
    }

    /// Typed attach directive; a missing field reads as detached
    ///
    /// # Errors
    /// `InvalidAttach` when the field cannot be interpreted.
    pub fn attach_directive(&self) -> Result<Attach, PlanError> {
        self.fields
            .get(ATTACH_FIELD)
            .map_or_else(|| Ok(Attach::detached()), Attach::from_value)
    }

    /// Child plan directives in declared order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[FanOut] {
        &self.children
    }

    /// Partition predicate
    #[inline]
    #[must_use]
    pub fn partition_predicate(&self) -> Option<&Predicate> {
        self.partition.as_ref()
    }

    /// Fallback plan
    #[inline]
    #[must_use]
    pub fn fallback_plan(&self) -> Option<&Plan> {
        self.fallback.as_deref()
    }

    /// Default rule as `(predicate, default content)`
    #[inline]
    #[must_use]
    pub fn default_rule(&self) -> Option<(&Predicate, &Value)> {
        self.default_if
            .as_ref()
            .map(|p| (p, self.default.as_ref().unwrap_or(&NULL)))
    }

    /// Per-plan default hook
    #[inline]
    #[must_use]
    pub fn default_hook(&self) -> Option<&DefaultFn> {
        self.default_with.as_ref()
    }

    /// `fail_if` rules in declared order
    #[inline]
    #[must_use]
    pub fn fail_rules(&self) -> &[FailRule] {
        &self.fail_if
    }

    /// Whether page counters are skipped for this step
    #[inline]
    #[must_use]
    pub fn skips_page_count(&self) -> bool {
        self.skip_page_count
    }
}

impl Debug for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("fields", &self.fields)
            .field("children", &self.children)
            .field("partition", &self.partition)
            .field("fallback", &self.fallback)
            .field("default_if", &self.default_if)
            .field("default", &self.default)
            .field("default_with", &self.default_with.is_some())
            .field("fail_if", &self.fail_if)
            .field("skip_page_count", &self.skip_page_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::AttachMode;
    use serde_json::json;

    #[test]
    fn builder_keeps_declared_order() {
        let plan = Plan::new("cake")
            .attach(Attach::detached())
            .field("value", 2)
            .for_this(Plan::new("a"))
            .for_each("list", Plan::new("b"))
            .for_first("list", Plan::new("c"));

        let keys: Vec<_> = plan.fields().keys().cloned().collect();
        assert_eq!(keys, ["as", "attach", "value"]);

        let scopes: Vec<_> = plan.children().iter().map(|c| c.scope.name()).collect();
        assert_eq!(scopes, ["this", "each", "first"]);
        assert_eq!(plan.children()[1].scope.list_field(), Some("list"));
    }

    #[test]
    fn binding_errors() {
        assert!(matches!(
            Plan::empty().binding(),
            Err(PlanError::MissingField { .. })
        ));
        assert!(matches!(
            Plan::empty().field("as", 5).binding(),
            Err(PlanError::InvalidBinding { .. })
        ));
        assert_eq!(Plan::new("cake").binding().unwrap(), "cake");
    }

    #[test]
    fn attach_directive_reads_field() {
        let plan = Plan::new("t").attach(Attach::relocate("t"));
        assert_eq!(
            plan.attach_directive().unwrap().mode,
            AttachMode::Relocate { to: "t".into() }
        );
        assert_eq!(Plan::new("x").attach_directive().unwrap(), Attach::detached());
        assert!(Plan::new("x").field("attach", true).attach_directive().is_err());
    }

    #[test]
    fn default_rule_pairs_predicate_and_value() {
        let plan = Plan::new("t").default_if(Predicate::field_eq("i", json!(2)), json!({"i": 3}));
        let (predicate, default) = plan.default_rule().unwrap();
        assert!(predicate.test(&json!({"i": 2})));
        assert_eq!(default, &json!({"i": 3}));
    }

    #[test]
    fn from_fields_and_get() {
        let mut fields = Fields::new();
        fields.insert("as".into(), json!("cake"));
        fields.insert("attach".into(), json!(false));
        let plan = Plan::from_fields(fields);
        assert_eq!(plan.get("attach"), Some(&json!(false)));
        assert!(plan.fallback_plan().is_none());
        assert!(!plan.skips_page_count());
    }
}
