//! MetaPlan - declarative plan interpreter
//!
//! Runs a tree of plan nodes through a host-supplied step runner and folds
//! child results back into their parents:
//! - Resolves `{"ref": "container.attribute"}` fields against earlier results
//! - Fans out to child plans once, for the first list element, or for each one
//! - Merges, replaces or relocates child content under per-node attach rules
//! - Fails fast on missing fields, reused bindings and `fail_if` rules
//!
//! # Example
//!
//! ```
//! use metaplan::{Attach, Interpreter, Plan, Reference, StepResult};
//! use serde_json::json;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let counter = AtomicI64::new(0);
//! let interpreter = Interpreter::from_fn(move |step, _args| {
//!     let c = counter.fetch_add(1, Ordering::SeqCst) + 1;
//!     Ok(StepResult::new(json!({"val": step.get("value"), "c": c})))
//! });
//!
//! let plan = Plan::new("cake").attach(Attach::detached()).for_this(
//!     Plan::new("topping")
//!         .attach(Attach::relocate("t"))
//!         .field("value", Reference::new("cake", "c")),
//! );
//!
//! let result = interpreter.run_plan(&plan)?;
//! assert_eq!(
//!     result.into_value(),
//!     json!({"content": {"val": null, "c": 1, "t": {"val": 1, "c": 2}}})
//! );
//! # Ok::<(), metaplan::PlanError>(())
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod attach;
pub mod config;
pub mod duration;
pub mod error;
pub mod hooks;
pub mod integrate;
pub mod interpreter;
pub mod partition;
pub mod plan;
pub mod predicate;
pub mod reference;
pub mod types;
pub mod validate;

// Re-exports for convenience
pub use attach::{Attach, AttachMode};
pub use config::InterpreterSettings;
pub use duration::IsoDuration;
pub use error::{PlanError, ValidationFailure};
pub use hooks::{
    DefaultFn, Hooks, InterpolateStepFn, MergeDownFn, PostStepFn, StepRunner,
    UnpackRefContainerFn,
};
pub use interpreter::Interpreter;
pub use partition::{partition, select_first, FirstChoice};
pub use plan::{FailRule, FanOut, Plan, Scope};
pub use predicate::{Predicate, PredicateFn, UnknownPredicate};
pub use reference::{is_structural_field, Reference};
pub use types::{Fields, State, Step, StepResult};
pub use validate::{lookup_path, validate_plan, validate_result};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and running plans
    pub use crate::{
        Attach, Interpreter, InterpreterSettings, Plan, PlanError, Predicate, Reference, State,
        Step, StepResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
