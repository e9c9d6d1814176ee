// src/lib.rs

//! opkit: composable, atomic multi-step business operations.
//!
//! An operation declares an ordered script of named steps on a [`Pipeline`].
//! Operations can:
//!  - Embed other operations as child scopes, with parameters computed from
//!    earlier results.
//!  - Extend themselves at run time from results produced so far (`defer`).
//!  - Look entities up from an injected [`EntityStore`].
//!  - Register callbacks that run before the transaction or after commit.
//!
//! The [`Engine`] runs the whole script through one [`TransactionExecutor`]
//! call, so it commits or rolls back as a unit, and hands back a [`ResultTree`]
//! nested the same way the operations were.

pub mod compose;
pub mod core;
pub mod engine;
pub mod error;
pub mod executor;
pub mod operation;
pub mod pipeline;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::core::{
  to_tree, Accumulator, CallbackResult, Changeset, Context, Diagnostic, FieldError, Params, Phase, Reason, ResultNode,
  ResultTree, ScopeId, ScopePath, StepKey, StepResult,
};
pub use crate::core::step::CallbackTask;

pub use crate::compose::{Embed, Source};
pub use crate::pipeline::{Execution, Lookup, Pipeline, Script};

pub use crate::operation::Operation;
pub use crate::engine::Engine;

pub use crate::executor::{InlineExecutor, TransactionExecutor};
pub use crate::store::{EntityStore, MemoryStore};

pub use crate::error::{ContractViolation, ExecutionError, RunError, RunResult};

/*
    Typical use:
    1. Implement `Operation` for a struct: `define` appends steps with
       `.step(name, |tree| async move { ... })`, nests other operations with
       `.embed(op, params)`, branches with `.defer(|p, tree| ...)`.
    2. Optionally override `changeset` to validate raw parameters.
    3. Create an `Engine` with a `TransactionExecutor` (and a store for lookups).
    4. `engine.run(&op, context, json!({...})).await` returns the result tree or
       a `RunError` naming the failing step and the partial results.
*/
