// opkit/src/pipeline/definition.rs

//! Contains the `Pipeline` builder state and the DSL calls that append steps and
//! register staged callbacks.

use crate::core::params::{Context, Params};
use crate::core::scope::{ScopePath, StepKey};
use crate::core::step::{callback_fn, step_fn, CallbackResult, CallbackTask, Entry, StepFn, StepResult};
use crate::core::tree::ResultTree;
use crate::error::ContractViolation;
use crate::store::EntityStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{event, Level};

/// The immutable part of a pipeline state, captured when a scope is built.
#[derive(Clone)]
pub(crate) struct Frame {
  pub(crate) operation: Arc<str>,
  pub(crate) scope: ScopePath,
  pub(crate) context: Context,
  pub(crate) params: Params,
  pub(crate) store: Option<Arc<dyn EntityStore>>,
}

/// Builder state threaded through an operation's definition.
///
/// Each DSL call consumes the pipeline and returns it with one more script entry
/// (or callback). The first contract violation is recorded and turns every later
/// call into a no-op; it is reported when the pipeline is run or spliced.
pub struct Pipeline {
  pub(crate) frame: Frame,
  pub(crate) script: Vec<Entry>,
  pub(crate) pre_transaction: Vec<CallbackTask>,
  // Step names and child scope identifiers already used in this scope. Shared with
  // the pipelines deferred callbacks build for the same scope.
  names: Arc<Mutex<HashSet<String>>>,
  // Built by a deferred callback rather than by an operation definition.
  extension: bool,
  fault: Option<ContractViolation>,
}

impl Pipeline {
  pub(crate) fn new(frame: Frame) -> Self {
    Self {
      frame,
      script: Vec::new(),
      pre_transaction: Vec::new(),
      names: Arc::new(Mutex::new(HashSet::new())),
      extension: false,
      fault: None,
    }
  }

  pub(crate) fn extension(frame: Frame, names: Arc<Mutex<HashSet<String>>>) -> Self {
    Self {
      names,
      extension: true,
      ..Self::new(frame)
    }
  }

  pub(crate) fn names(&self) -> Arc<Mutex<HashSet<String>>> {
    self.names.clone()
  }

  /// Name of the operation that owns this scope.
  pub fn operation(&self) -> &str {
    &self.frame.operation
  }

  pub fn scope(&self) -> &ScopePath {
    &self.frame.scope
  }

  pub fn context(&self) -> &Context {
    &self.frame.context
  }

  pub fn params(&self) -> &Params {
    &self.frame.params
  }

  pub fn store(&self) -> Option<&Arc<dyn EntityStore>> {
    self.frame.store.as_ref()
  }

  /// True only for the root scope of a run as built by its operation definition.
  pub fn is_root(&self) -> bool {
    self.frame.scope.is_root() && !self.extension
  }

  /// Keys of the steps declared so far, in script order. Entries produced later by
  /// embedding or deferral are not known yet and not listed.
  pub fn keys(&self) -> Vec<&StepKey> {
    self
      .script
      .iter()
      .filter_map(|entry| match entry {
        Entry::Step { key, .. } => Some(key),
        _ => None,
      })
      .collect()
  }

  /// Number of script entries (steps, splices and callback registrations).
  pub fn len(&self) -> usize {
    self.script.len()
  }

  pub fn is_empty(&self) -> bool {
    self.script.is_empty()
  }

  /// The contract violation recorded during build, if any.
  pub fn fault(&self) -> Option<&ContractViolation> {
    self.fault.as_ref()
  }

  pub(crate) fn record(&mut self, violation: ContractViolation) {
    if self.fault.is_none() {
      event!(Level::ERROR, operation = %self.frame.operation, scope = %self.frame.scope, error = %violation, "Contract violation recorded during build.");
      self.fault = Some(violation);
    }
  }

  /// Claims `name` in this scope. Returns false (recording a violation on a
  /// duplicate) when the entry must not be appended.
  pub(crate) fn reserve(&mut self, name: &str) -> bool {
    if self.fault.is_some() {
      return false;
    }
    let claimed = self.names.lock().insert(name.to_string());
    if !claimed {
      let violation = ContractViolation::DuplicateName {
        operation: self.frame.operation.to_string(),
        scope: self.frame.scope.clone(),
        name: name.to_string(),
      };
      self.record(violation);
      return false;
    }
    true
  }

  pub(crate) fn push_step(mut self, name: &str, run: StepFn) -> Self {
    if self.reserve(name) {
      let key = self.frame.scope.key_for(name);
      event!(Level::TRACE, step = %key, "Step declared.");
      self.script.push(Entry::Step { key, run });
    }
    self
  }

  /// Appends a step named `name`. The body gets the tree of everything completed
  /// at or below this scope and returns the step's value or a failure reason.
  pub fn step<F, Fut>(self, name: &str, body: F) -> Self
  where
    F: Fn(ResultTree) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
  {
    self.push_step(name, step_fn(body))
  }

  /// Registers a callback that runs once before the atomic script, on a bare
  /// accumulator whose entries then seed the script. Root scope only.
  pub fn before_transaction<F, Fut>(mut self, callback: F) -> Self
  where
    F: Fn(ResultTree) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
  {
    if self.fault.is_some() {
      return self;
    }
    if !self.is_root() {
      let violation = ContractViolation::PreTransactionOutsideRoot {
        operation: self.frame.operation.to_string(),
        scope: self.frame.scope.clone(),
      };
      self.record(violation);
      return self;
    }
    self.pre_transaction.push(CallbackTask {
      scope: self.frame.scope.clone(),
      callback: callback_fn(callback),
    });
    self
  }

  /// Registers a callback that runs after commit on this scope's subtree of the
  /// committed result. Whatever it returns replaces that subtree for later
  /// callbacks and for the final result.
  pub fn after_commit<F, Fut>(mut self, callback: F) -> Self
  where
    F: Fn(ResultTree) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
  {
    if self.fault.is_some() {
      return self;
    }
    self.script.push(Entry::AfterCommit(CallbackTask {
      scope: self.frame.scope.clone(),
      callback: callback_fn(callback),
    }));
    self
  }

  /// Hands the built script and pre-transaction callbacks to the caller, or the
  /// recorded violation.
  pub(crate) fn into_parts(self) -> Result<(Vec<Entry>, Vec<CallbackTask>), ContractViolation> {
    match self.fault {
      Some(violation) => Err(violation),
      None => Ok((self.script, self.pre_transaction)),
    }
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("operation", &self.frame.operation)
      .field("scope", &self.frame.scope)
      .field("script", &self.script)
      .field("pre_transaction", &self.pre_transaction.len())
      .field("fault", &self.fault)
      .finish()
  }
}
