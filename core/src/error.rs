// opkit/src/error.rs

use crate::core::params::Diagnostic;
use crate::core::phase::Phase;
use crate::core::scope::{ScopePath, StepKey};
use crate::core::step::Reason;
use crate::core::tree::{Accumulator, ResultTree};
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// A programming error in an operation definition. Never retried and never
/// turned into a recoverable outcome.
#[derive(Debug, Clone, Error)]
pub enum ContractViolation {
  #[error("Operation '{operation}': name '{name}' is declared twice in scope {scope}")]
  DuplicateName {
    operation: String,
    scope: ScopePath,
    name: String,
  },

  #[error("Operation '{operation}': lookup step '{step}' has an empty identifier path")]
  EmptyLookupPath { operation: String, step: String },

  #[error("Operation '{operation}': lookup step '{step}' has no entity store configured")]
  StoreUnavailable { operation: String, step: String },

  #[error("Operation '{operation}': pre-transaction callback registered outside the root scope ({scope})")]
  PreTransactionOutsideRoot { operation: String, scope: ScopePath },

  #[error("Operation '{operation}': definition returned a pipeline for scope {found}, expected {expected}")]
  ScopeMismatch {
    operation: String,
    expected: ScopePath,
    found: ScopePath,
  },

  #[error("Operation '{operation}': definition panicked in scope {scope}: {message}")]
  DefinitionFault {
    operation: String,
    scope: ScopePath,
    message: String,
  },

  #[error("Operation '{operation}': step '{step}' panicked: {message}")]
  StepEvaluation {
    operation: String,
    step: StepKey,
    accumulator: Accumulator,
    message: String,
  },

  #[error("Operation '{operation}': deferred callback in scope {scope} panicked: {message}")]
  DeferEvaluation {
    operation: String,
    scope: ScopePath,
    accumulator: Accumulator,
    message: String,
  },

  #[error("Operation '{operation}': {phase} callback in scope {scope} panicked: {message}")]
  CallbackEvaluation {
    operation: String,
    phase: Phase,
    scope: ScopePath,
    message: String,
  },
}

/// How a script run ended when it did not commit. Returned by
/// [`TransactionExecutor`](crate::TransactionExecutor) implementations.
#[derive(Debug, Error)]
pub enum ExecutionError {
  #[error("Step '{key}' failed: {reason}")]
  StepFailed {
    key: StepKey,
    reason: Reason,
    partial: Accumulator,
  },

  #[error(transparent)]
  Contract(#[from] ContractViolation),

  /// The executor itself failed (storage fault, commit failure, ...).
  #[error("Transaction executor failure. Source: {0}")]
  Executor(#[source] AnyhowError),
}

/// Every way [`Engine::run`](crate::Engine::run) can end without a result tree.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("Invalid parameters: {0}")]
  ParameterInvalid(Diagnostic),

  #[error("Step '{key}' failed: {reason}")]
  StepFailed {
    key: StepKey,
    reason: Reason,
    partial: Accumulator,
    root: ScopePath,
  },

  #[error("Pre-transaction callback failed: {reason}")]
  PreTransactionFailed { reason: Reason, partial: ResultTree },

  #[error("Transaction executor failure. Source: {0}")]
  Executor(#[source] AnyhowError),

  /// The atomic work is committed; `tree` is what the callbacks before the failing
  /// one left behind.
  #[error("Post-commit callback failed: {reason}")]
  PostCommitFailed { reason: Reason, tree: ResultTree },

  #[error(transparent)]
  Contract(#[from] ContractViolation),
}

impl RunError {
  pub fn is_contract_violation(&self) -> bool {
    matches!(self, RunError::Contract(_))
  }

  /// For a step failure, the completed steps projected onto the root-scoped tree.
  pub fn partial_tree(&self) -> Option<ResultTree> {
    match self {
      RunError::StepFailed { partial, root, .. } => Some(partial.to_tree(root)),
      RunError::PreTransactionFailed { partial, .. } => Some(partial.clone()),
      _ => None,
    }
  }

  pub fn reason(&self) -> Option<&Reason> {
    match self {
      RunError::StepFailed { reason, .. }
      | RunError::PreTransactionFailed { reason, .. }
      | RunError::PostCommitFailed { reason, .. } => Some(reason),
      _ => None,
    }
  }

  pub(crate) fn from_execution(err: ExecutionError, root: &ScopePath) -> Self {
    match err {
      ExecutionError::StepFailed { key, reason, partial } => RunError::StepFailed {
        key,
        reason,
        partial,
        root: root.clone(),
      },
      ExecutionError::Contract(v) => RunError::Contract(v),
      ExecutionError::Executor(e) => RunError::Executor(e),
    }
  }
}

pub type RunResult<T, E = RunError> = std::result::Result<T, E>;
