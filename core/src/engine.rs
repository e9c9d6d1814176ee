// opkit/src/engine.rs

//! Defines `Engine`, which builds an operation's root pipeline and drives a run
//! through its phases: pre-transaction callbacks, the atomic script, post-commit
//! callbacks.

use crate::core::params::Context;
use crate::core::phase::Phase;
use crate::core::scope::{ScopeId, ScopePath};
use crate::core::step::guarded;
use crate::core::tree::{Accumulator, ResultTree};
use crate::error::{ContractViolation, RunError};
use crate::executor::{InlineExecutor, TransactionExecutor};
use crate::operation::{define_in, validate, Operation};
use crate::pipeline::definition::{Frame, Pipeline};
use crate::pipeline::execution::Script;
use crate::store::{EntityStore, MemoryStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Entry point for running operations. Holds the injected transaction executor
/// and, optionally, the entity store used by lookup steps.
#[derive(Clone)]
pub struct Engine {
  executor: Arc<dyn TransactionExecutor>,
  store: Option<Arc<dyn EntityStore>>,
}

impl Engine {
  pub fn new(executor: Arc<dyn TransactionExecutor>) -> Self {
    Self { executor, store: None }
  }

  /// An engine whose scripts run through [`InlineExecutor`], with no store.
  pub fn inline() -> Self {
    Self::new(Arc::new(InlineExecutor))
  }

  /// An engine that uses `store` both as its executor and as its entity store.
  pub fn memory(store: Arc<MemoryStore>) -> Self {
    Self {
      executor: store.clone(),
      store: Some(store),
    }
  }

  /// Makes `store` available to every pipeline this engine builds.
  pub fn with_store(mut self, store: Arc<dyn EntityStore>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn executor(&self) -> &Arc<dyn TransactionExecutor> {
    &self.executor
  }

  pub fn store(&self) -> Option<&Arc<dyn EntityStore>> {
    self.store.as_ref()
  }

  /// Validates `raw` and builds the root pipeline of `operation` under a fresh
  /// root scope, without running anything.
  #[instrument(name = "Engine::build", skip_all, fields(operation = %operation.name()), err(Display))]
  pub fn build<O: Operation>(&self, operation: &O, context: Context, raw: Value) -> Result<Pipeline, RunError> {
    event!(Level::DEBUG, phase = %Phase::Validating, "Entering phase.");
    let params = validate(operation, raw).map_err(|diagnostic| {
      event!(Level::WARN, %diagnostic, "Parameters rejected.");
      RunError::ParameterInvalid(diagnostic)
    })?;

    event!(Level::DEBUG, phase = %Phase::Building, "Entering phase.");
    let frame = Frame {
      operation: Arc::from(operation.name()),
      scope: ScopePath::root(ScopeId::generate()),
      context,
      params,
      store: self.store.clone(),
    };
    let pipeline = define_in(operation, frame)?;
    if let Some(violation) = pipeline.fault() {
      return Err(violation.clone().into());
    }
    Ok(pipeline)
  }

  /// Runs `operation` with `context` and the unvalidated parameters `raw`.
  ///
  /// On success returns the committed results as a tree shaped like the
  /// operation's scope hierarchy, as rewritten by its post-commit callbacks.
  #[instrument(name = "Engine::run", skip_all, fields(operation = %operation.name()), err(Display))]
  pub async fn run<O: Operation>(&self, operation: &O, context: Context, raw: Value) -> Result<ResultTree, RunError> {
    let pipeline = self.build(operation, context, raw)?;
    let root = pipeline.scope().clone();
    let name = pipeline.frame.operation.clone();
    let names = pipeline.names();
    let (entries, pre_transaction) = pipeline.into_parts()?;

    event!(Level::DEBUG, phase = %Phase::PreTransaction, callbacks = pre_transaction.len(), "Entering phase.");
    let mut bare = ResultTree::new();
    for task in &pre_transaction {
      let outcome = guarded(async { (task.callback)(bare.clone()).await }).await;
      match outcome {
        Ok(Ok(tree)) => bare = tree,
        Ok(Err(reason)) => {
          event!(Level::WARN, %reason, "Pre-transaction callback failed; script not started.");
          return Err(RunError::PreTransactionFailed { reason, partial: bare });
        }
        Err(message) => {
          return Err(
            ContractViolation::CallbackEvaluation {
              operation: name.to_string(),
              phase: Phase::PreTransaction,
              scope: task.scope.clone(),
              message,
            }
            .into(),
          );
        }
      }
    }

    // Seeded entries live at the root scope, next to its steps and children.
    {
      let mut claimed = names.lock();
      if let Some(clash) = bare.iter().map(|(seeded, _)| seeded).find(|seeded| !claimed.insert(seeded.to_string())) {
        let violation = ContractViolation::DuplicateName {
          operation: name.to_string(),
          scope: root.clone(),
          name: clash.clone(),
        };
        event!(Level::ERROR, error = %violation, "Pre-transaction result clashes with a root entry.");
        return Err(violation.into());
      }
    }

    event!(Level::DEBUG, phase = %Phase::AtomicExecution, entries = entries.len(), seeded = bare.len(), "Entering phase.");
    let seed = Accumulator::from_entries(bare.flatten(&root));
    let script = Script::new(name.clone(), entries, seed);
    let execution = self
      .executor
      .transaction(script)
      .await
      .map_err(|e| RunError::from_execution(e, &root))?;

    event!(Level::DEBUG, phase = %Phase::PostCommit, callbacks = execution.after_commit.len(), "Entering phase.");
    let mut tree = execution.results.to_tree(&root);
    for task in &execution.after_commit {
      let path = task.scope.relative_to(&root).unwrap_or_default();
      let existing = tree.subtree(path).cloned();
      let had_subtree = existing.is_some();
      let view = existing.unwrap_or_default();

      let outcome = guarded(async { (task.callback)(view).await }).await;
      match outcome {
        Ok(Ok(rewritten)) => {
          // A scope that produced nothing gets no empty subtree unless the callback adds to it.
          if had_subtree || !rewritten.is_empty() {
            tree.replace_subtree(path, rewritten);
          }
        }
        Ok(Err(reason)) => {
          event!(Level::WARN, scope = %task.scope, %reason, "Post-commit callback failed; committed work stays.");
          return Err(RunError::PostCommitFailed { reason, tree });
        }
        Err(message) => {
          return Err(
            ContractViolation::CallbackEvaluation {
              operation: name.to_string(),
              phase: Phase::PostCommit,
              scope: task.scope.clone(),
              message,
            }
            .into(),
          );
        }
      }
    }

    event!(Level::DEBUG, phase = %Phase::Done, results = tree.len(), "Run complete.");
    Ok(tree)
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::inline()
  }
}

impl std::fmt::Debug for Engine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Engine").field("store", &self.store.is_some()).finish()
  }
}
