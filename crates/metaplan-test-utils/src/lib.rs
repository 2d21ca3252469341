//! Testing utilities for MetaPlan workspace
//!
//! Shared step runners, fixtures, and tracing setup.

#![allow(missing_docs)]

use metaplan::{Fields, Step, StepResult, StepRunner};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metaplan=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// Install a test-writer subscriber once, filtered by `RUST_LOG`
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}

/// Unwrap a `json!` mapping into ordered fields
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a mapping, got {other}"),
    }
}

/// Step result with the given content and metadata
pub fn result_with_metadata(content: Value, metadata: Value) -> StepResult {
    StepResult::new(content).with_metadata(fields(metadata))
}

type Respond = dyn Fn(&Step, &[Value], usize) -> anyhow::Result<StepResult> + Send + Sync;

/// Step runner that records every call and answers through a closure
///
/// The closure also receives the 1-based call number. Clones share the same
/// call log, so a test can keep one handle and give another to the
/// interpreter.
#[derive(Clone)]
pub struct RecordingRunner {
    respond: Arc<Respond>,
    calls: Arc<AtomicUsize>,
    steps: Arc<Mutex<Vec<Step>>>,
    args: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl RecordingRunner {
    pub fn new(
        respond: impl Fn(&Step, &[Value], usize) -> anyhow::Result<StepResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Arc::new(respond),
            calls: Arc::new(AtomicUsize::new(0)),
            steps: Arc::new(Mutex::new(Vec::new())),
            args: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always return the same result
    pub fn returning(result: StepResult) -> Self {
        Self::new(move |_, _, _| Ok(result.clone()))
    }

    /// Return content built from the step and call number
    pub fn content(f: impl Fn(&Step, usize) -> Value + Send + Sync + 'static) -> Self {
        Self::new(move |step, _, n| Ok(StepResult::new(f(step, n))))
    }

    /// Answer by binding name; unknown bindings get null content
    pub fn by_binding<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let answers: Vec<(String, Value)> =
            answers.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(move |step, _, _| {
            let content = answers
                .iter()
                .find(|(name, _)| Some(name.as_str()) == step.binding())
                .map_or(Value::Null, |(_, content)| content.clone());
            Ok(StepResult::new(content))
        })
    }

    /// Fail every call with the given message
    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_, _, _| Err(anyhow::anyhow!(message)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Steps received so far, in call order
    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().clone()
    }

    /// Binding names received so far, in call order
    pub fn bindings(&self) -> Vec<String> {
        self.steps
            .lock()
            .iter()
            .filter_map(|step| step.binding().map(ToString::to_string))
            .collect()
    }

    /// Host arguments received so far, in call order
    pub fn args(&self) -> Vec<Vec<Value>> {
        self.args.lock().clone()
    }
}

impl StepRunner for RecordingRunner {
    fn run_step(&self, step: &Step, args: &[Value]) -> anyhow::Result<StepResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.steps.lock().push(step.clone());
        self.args.lock().push(args.to_vec());
        (self.respond)(step, args, n)
    }
}

/// Runner returning `{"val": <step value>, "c": <call number>}`
pub fn counting_runner() -> RecordingRunner {
    RecordingRunner::content(|step, n| {
        serde_json::json!({"val": step.get("value").cloned().unwrap_or(Value::Null), "c": n})
    })
}
