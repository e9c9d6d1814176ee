// opkit/src/core/mod.rs

pub mod params;
pub mod phase;
pub mod scope;
pub mod step;
pub mod tree;

// Flat re-exports for lib.rs
pub use params::{Changeset, Context, Diagnostic, FieldError, Params};
pub use phase::Phase;
pub use scope::{ScopeId, ScopePath, StepKey};
pub use step::{CallbackFuture, CallbackResult, Reason, StepFuture, StepResult};
pub use tree::{to_tree, Accumulator, ResultNode, ResultTree};
