// opkit/src/core/step.rs

//! Script entries and the function types behind steps and staged callbacks.

use crate::core::scope::{ScopePath, StepKey};
use crate::core::tree::{Accumulator, ResultTree};
use crate::error::ContractViolation;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Why a step or callback refused to continue. Opaque to the engine and handed
/// back to the caller untouched.
pub type Reason = Value;

/// What a step body returns: its value on success or a failure reason.
pub type StepResult = Result<Value, Reason>;
pub type StepFuture = BoxFuture<'static, StepResult>;

/// What a staged callback returns: the (possibly rewritten) tree or a reason.
pub type CallbackResult = Result<ResultTree, Reason>;
pub type CallbackFuture = BoxFuture<'static, CallbackResult>;

/// A user step body. Receives the tree scoped to the step's own scope.
pub(crate) type StepFn = Arc<dyn Fn(ResultTree) -> StepFuture + Send + Sync + 'static>;

/// A staged (pre-transaction or post-commit) callback body.
pub(crate) type CallbackFn = Arc<dyn Fn(ResultTree) -> CallbackFuture + Send + Sync + 'static>;

/// Produces the entries to splice in place of a `Splice` entry, given the live
/// accumulator.
pub(crate) type SpliceFn = Arc<dyn Fn(&Accumulator) -> Result<Vec<Entry>, SpliceError> + Send + Sync + 'static>;

pub(crate) fn step_fn<F, Fut>(f: F) -> StepFn
where
  F: Fn(ResultTree) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = StepResult> + Send + 'static,
{
  Arc::new(move |tree| Box::pin(f(tree)))
}

pub(crate) fn callback_fn<F, Fut>(f: F) -> CallbackFn
where
  F: Fn(ResultTree) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = CallbackResult> + Send + 'static,
{
  Arc::new(move |tree| Box::pin(f(tree)))
}

/// A staged callback together with the scope it was registered in.
#[derive(Clone)]
pub struct CallbackTask {
  pub(crate) scope: ScopePath,
  pub(crate) callback: CallbackFn,
}

impl CallbackTask {
  pub fn scope(&self) -> &ScopePath {
    &self.scope
  }
}

impl std::fmt::Debug for CallbackTask {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CallbackTask").field("scope", &self.scope).finish()
  }
}

/// One element of an ordered script.
#[derive(Clone)]
pub(crate) enum Entry {
  /// Evaluates a step and records its value under `key`.
  Step { key: StepKey, run: StepFn },
  /// Replaced, when reached, by the entries `expand` produces.
  Splice {
    scope: ScopePath,
    label: String,
    expand: SpliceFn,
  },
  /// Queues a post-commit callback. Only callbacks whose entry was reached are run.
  AfterCommit(CallbackTask),
}

impl std::fmt::Debug for Entry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Entry::Step { key, .. } => f.debug_tuple("Step").field(key).finish(),
      Entry::Splice { scope, label, .. } => f.debug_struct("Splice").field("scope", scope).field("label", label).finish(),
      Entry::AfterCommit(task) => f.debug_tuple("AfterCommit").field(task.scope()).finish(),
    }
  }
}

pub(crate) enum SpliceError {
  /// The splice itself failed at runtime the way a step fails (e.g. an embedded
  /// child rejected its parameters).
  Failed { key: StepKey, reason: Reason },
  Contract(ContractViolation),
}

impl From<ContractViolation> for SpliceError {
  fn from(v: ContractViolation) -> Self {
    SpliceError::Contract(v)
  }
}

/// Polls `fut` to completion, turning a panic into its message.
pub(crate) async fn guarded<T>(fut: impl Future<Output = T>) -> Result<T, String> {
  AssertUnwindSafe(fut).catch_unwind().await.map_err(panic_message)
}

/// Synchronous counterpart of [`guarded`].
pub(crate) fn guarded_sync<T>(f: impl FnOnce() -> T) -> Result<T, String> {
  std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
