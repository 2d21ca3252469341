//! Plan interpreter
//!
//! [`Interpreter::run`] drives one plan node through
//! validate → prepare → execute → validate result → post-step → fan-out,
//! re-entering the same pipeline for every child plan. Each recursion binds
//! the parent's `as` name to the data the child runs against:
//!
//! | Scope | Child runs against | Result folds into |
//! |---|---|---|
//! | [`Scope::This`] | parent content | parent result |
//! | [`Scope::First`] | first primary list element | parent result |
//! | fallback | the whole, unmodified parent result | parent result |
//! | [`Scope::Each`] | every list element | that element |
//!
//! The interpreter holds no mutable state; one value can serve any number of
//! concurrent `run` calls as long as the runner and hooks are reentrant.

use crate::attach::{Attach, AttachMode};
use crate::config::InterpreterSettings;
use crate::error::{kind_of, PlanError};
use crate::hooks::{Hooks, StepRunner};
use crate::integrate::{
    add_effort, apply, check_compatible, extract_payload, propagate_updated_at, skip_page_counts,
};
use crate::partition::{select_first, FirstChoice};
use crate::plan::{FanOut, Plan, Scope};
use crate::reference::Resolver;
use crate::types::{Fields, State, Step, StepResult, CONTENT_KEY};
use crate::validate::{validate_plan, validate_result};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Step field overriding the delivered page count of its result
pub const SET_PAGE_COUNT_DELIVERED: &str = "set_page_count_delivered";

/// Metadata counter written by [`SET_PAGE_COUNT_DELIVERED`]
pub const PAGE_COUNT_DELIVERED: &str = "page_count_delivered";

/// Recursive plan interpreter
///
/// Cheap to clone: the runner and hooks are reference counted.
#[derive(Clone)]
pub struct Interpreter {
    runner: Arc<dyn StepRunner>,
    hooks: Hooks,
    settings: InterpreterSettings,
}

impl Interpreter {
    /// Create interpreter around a step runner with default settings
    #[must_use]
    pub fn new(runner: impl StepRunner + 'static) -> Self {
        Self {
            runner: Arc::new(runner),
            hooks: Hooks::default(),
            settings: InterpreterSettings::default(),
        }
    }

    /// Create interpreter from a step closure
    #[must_use]
    pub fn from_fn(
        f: impl Fn(&Step, &[Value]) -> anyhow::Result<StepResult> + Send + Sync + 'static,
    ) -> Self {
        Self::new(f)
    }

    /// With settings
    #[inline]
    #[must_use]
    pub fn with_settings(mut self, settings: InterpreterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// With a complete hook set
    #[inline]
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// With required plan fields
    #[must_use]
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings = self.settings.with_required_fields(fields);
        self
    }

    /// Rewrite every resolved step before it runs
    #[must_use]
    pub fn on_interpolate_step(
        mut self,
        f: impl Fn(&mut Step, &State, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.interpolate_step = Some(Arc::new(f));
        self
    }

    /// Supply reference containers ahead of state lookup
    #[must_use]
    pub fn on_unpack_ref_container(
        mut self,
        f: impl Fn(&str, &[Value]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.unpack_ref_container = Some(Arc::new(f));
        self
    }

    /// Observe or mutate every step result before fan-out
    #[must_use]
    pub fn on_post_step(
        mut self,
        f: impl Fn(&Step, &mut StepResult) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.post_step = Some(Arc::new(f));
        self
    }

    /// Observe or mutate every integration target before a child lands
    #[must_use]
    pub fn on_merge_down(
        mut self,
        f: impl Fn(&mut Fields, &StepResult) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.merge_down_step = Some(Arc::new(f));
        self
    }

    /// Current settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &InterpreterSettings {
        &self.settings
    }

    /// Installed hooks
    #[inline]
    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Run a plan tree
    ///
    /// `state` seeds the bindings visible to the root node; `args` are handed
    /// unchanged to the runner and every hook.
    ///
    /// # Errors
    /// The first failure anywhere in the tree aborts the run; no partial
    /// result is returned.
    pub fn run(&self, plan: &Plan, state: &State, args: &[Value]) -> Result<StepResult, PlanError> {
        self.run_at(plan, state, args, 0)
    }

    /// Run a plan tree with empty state and no host arguments
    ///
    /// # Errors
    /// See [`Interpreter::run`].
    pub fn run_plan(&self, plan: &Plan) -> Result<StepResult, PlanError> {
        self.run(plan, &State::new(), &[])
    }

    /// Resolve a plan node into a concrete step
    ///
    /// Every non-structural field is run through reference resolution, then
    /// the `interpolate_step` hook may rewrite the step.
    ///
    /// # Errors
    /// Reference resolution failures and host hook errors.
    pub fn prepare_step(
        &self,
        plan: &Plan,
        state: &State,
        args: &[Value],
    ) -> Result<Step, PlanError> {
        let resolver = Resolver::new(state, args, self.hooks.unpack_ref_container.as_ref());
        let fields = plan
            .fields()
            .iter()
            .map(|(name, value)| Ok((name.clone(), resolver.resolve_field(name, value)?)))
            .collect::<Result<Fields, PlanError>>()?;

        let mut step = Step::new(fields);
        if let Some(interpolate) = &self.hooks.interpolate_step {
            interpolate(&mut step, state, args)?;
        }
        Ok(step)
    }

    fn run_at(
        &self,
        plan: &Plan,
        state: &State,
        args: &[Value],
        depth: usize,
    ) -> Result<StepResult, PlanError> {
        validate_plan(plan, state, &self.settings.required_fields)?;
        let binding = plan.binding()?;

        let span = tracing::debug_span!("step", binding, depth);
        let _guard = span.enter();

        let step = self.prepare_step(plan, state, args)?;
        let mut result = self.execute(&step, args)?;
        validate_result(plan.fail_rules(), &result)?;
        set_page_count_delivered(&step, &mut result);

        if let Some(post_step) = &self.hooks.post_step {
            post_step(&step, &mut result)?;
        }

        self.dispatch(plan, binding, &result, state, args, depth)
    }

    fn execute(&self, step: &Step, args: &[Value]) -> Result<StepResult, PlanError> {
        tracing::debug!("Executing step {}", step.binding().unwrap_or_default());
        Ok(self.runner.run_step(step, args)?)
    }

    /// Run every child directive in declared order against a copy of `original`
    fn dispatch(
        &self,
        plan: &Plan,
        binding: &str,
        original: &StepResult,
        state: &State,
        args: &[Value],
        depth: usize,
    ) -> Result<StepResult, PlanError> {
        let mut result = original.clone();
        let mut pending_skip = plan.skips_page_count();
        let cx = Descent {
            binding,
            state,
            args,
            depth,
        };

        for FanOut { scope, plan: child } in plan.children() {
            match scope {
                Scope::This => {
                    if result.content().is_null() {
                        tracing::debug!("Skipping this scope: null content");
                        pending_skip = false;
                        continue;
                    }
                    self.descend(&mut pending_skip, &mut result);
                    let child_result = self.run_child(child, result.content().clone(), &cx)?;
                    add_effort(&mut result, &child_result, &self.settings.effort_counters);
                    self.integrate(&child.attach_directive()?, result.fields_mut(), &child_result)?;
                }

                Scope::First(list) => {
                    let Some(items) = list_items(&result, list)? else {
                        tracing::debug!("Skipping first scope: no list {}", list);
                        pending_skip = false;
                        continue;
                    };
                    let fallback = plan.fallback_plan();
                    match select_first(plan.partition_predicate(), items, fallback.is_some()) {
                        FirstChoice::Primary(element) => {
                            tracing::debug!("First scope on {}: primary element", list);
                            self.descend(&mut pending_skip, &mut result);
                            let child_result = self.run_child(child, element, &cx)?;
                            add_effort(&mut result, &child_result, &self.settings.effort_counters);
                            self.integrate(&child.attach_directive()?, result.fields_mut(), &child_result)?;
                        }
                        FirstChoice::Fallback => {
                            let Some(fallback) = fallback else { continue };
                            tracing::debug!("First scope on {}: fallback plan", list);
                            self.descend(&mut pending_skip, &mut result);
                            let child_result = self.run_child(fallback, original.to_value(), &cx)?;
                            add_effort(&mut result, &child_result, &self.settings.effort_counters);
                            self.integrate(&fallback.attach_directive()?, result.fields_mut(), &child_result)?;
                        }
                        FirstChoice::Nothing => {
                            tracing::debug!("First scope on {}: nothing to run", list);
                            pending_skip = false;
                            self.integrate(&child.attach_directive()?, result.fields_mut(), &StepResult::empty())?;
                        }
                    }
                }

                Scope::Each(list) => {
                    let Some(items) = list_items(&result, list)? else {
                        tracing::debug!("Skipping each scope: no list {}", list);
                        pending_skip = false;
                        continue;
                    };
                    self.descend(&mut pending_skip, &mut result);

                    let attach = child.attach_directive()?;
                    let mut folded = Vec::with_capacity(items.len());
                    for mut element in items {
                        let child_result = match child.default_rule() {
                            Some((predicate, default)) if predicate.test(&element) => {
                                tracing::debug!("Each scope on {}: default for element", list);
                                StepResult::new(default.clone())
                            }
                            _ => {
                                let child_result = self.run_child(child, element.clone(), &cx)?;
                                add_effort(&mut result, &child_result, &self.settings.effort_counters);
                                child_result
                            }
                        };
                        self.integrate_element(&attach, &mut element, &child_result)?;
                        folded.push(element);
                    }

                    if let Some(Value::Object(content)) = result.fields_mut().get_mut(CONTENT_KEY) {
                        content.insert(list.clone(), Value::Array(folded));
                    }
                }
            }
        }

        if pending_skip {
            skip_page_counts(&mut result, &self.settings.page_count_fields);
        }
        Ok(result)
    }

    /// Zero the parent's page counters the first time it descends
    fn descend(&self, pending_skip: &mut bool, result: &mut StepResult) {
        if std::mem::take(pending_skip) {
            skip_page_counts(result, &self.settings.page_count_fields);
        }
    }

    fn run_child(&self, child: &Plan, bound: Value, cx: &Descent<'_>) -> Result<StepResult, PlanError> {
        if let Some(default_with) = child.default_hook() {
            if let Some(result) = default_with(child, &bound, cx.args)? {
                tracing::debug!("Using default_with result for {}", child.binding()?);
                return Ok(result);
            }
        }
        let state = cx.state.bind(cx.binding, bound);
        self.run_at(child, &state, cx.args, cx.depth + 1)
    }

    /// Fold a child result into a target mapping
    ///
    /// Compatibility is checked before the timestamp, the merge-down hook or
    /// the payload touch the target.
    fn integrate(&self, attach: &Attach, target: &mut Fields, source: &StepResult) -> Result<(), PlanError> {
        if attach.mode == AttachMode::Detached {
            return Ok(());
        }
        let payload = extract_payload(attach, source)?;
        check_compatible(&attach.mode, target, &payload)?;

        propagate_updated_at(target, source);
        if let Some(merge_down) = &self.hooks.merge_down_step {
            merge_down(target, source)?;
        }
        apply(attach, target, payload)
    }

    fn integrate_element(
        &self,
        attach: &Attach,
        element: &mut Value,
        source: &StepResult,
    ) -> Result<(), PlanError> {
        match element {
            Value::Object(fields) => self.integrate(attach, fields, source),
            _ if attach.mode == AttachMode::Detached => Ok(()),
            other => Err(PlanError::IncompatibleTarget {
                strategy: attach.mode.name(),
                found: kind_of(other),
            }),
        }
    }
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("hooks", &self.hooks)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Where a child recursion starts from
struct Descent<'a> {
    binding: &'a str,
    state: &'a State,
    args: &'a [Value],
    depth: usize,
}

/// Copy of a list field of the result content
///
/// `None` when the content is null, not a mapping, or lacks the field (or
/// holds null there).
fn list_items(result: &StepResult, list: &str) -> Result<Option<Vec<Value>>, PlanError> {
    match result.content().get(list) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(_) => Err(PlanError::NotAList {
            field: list.to_string(),
        }),
    }
}

fn set_page_count_delivered(step: &Step, result: &mut StepResult) {
    let Some(value) = step.get(SET_PAGE_COUNT_DELIVERED) else {
        return;
    };
    match (page_count(value), result.metadata_mut()) {
        (Some(count), Some(metadata)) => {
            metadata.insert(PAGE_COUNT_DELIVERED.to_string(), Value::from(count));
        }
        (None, _) => tracing::warn!("Ignoring non-numeric {}: {}", SET_PAGE_COUNT_DELIVERED, value),
        (Some(_), None) => {}
    }
}

/// Integer page count, truncating fractions
///
/// Strings contribute their leading integer digits, or 0 when they have none.
fn page_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            n.as_f64().map(|f| f.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim_start();
            let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            let magnitude = digits[..end].parse::<i64>().unwrap_or(0);
            Some(if s.starts_with('-') { -magnitude } else { magnitude })
        }
        _ => None,
    }
}
