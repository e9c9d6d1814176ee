// opkit/src/pipeline/execution.rs

//! Contains `Script`, the ordered entry list handed to a transaction executor, and
//! the walk that evaluates it.

use crate::core::scope::StepKey;
use crate::core::step::{guarded, CallbackTask, Entry, SpliceError};
use crate::core::tree::Accumulator;
use crate::error::{ContractViolation, ExecutionError};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// The ordered work of one operation run, seeded with the pre-transaction
/// accumulator. Splice entries grow the script while it runs.
pub struct Script {
  operation: Arc<str>,
  entries: Vec<Entry>,
  seed: Accumulator,
}

/// A fully evaluated script: the flat results in completion order and the
/// post-commit callbacks reached along the way, in the order they were reached.
#[derive(Debug, Default)]
pub struct Execution {
  pub results: Accumulator,
  pub after_commit: Vec<CallbackTask>,
}

impl Script {
  pub(crate) fn new(operation: Arc<str>, entries: Vec<Entry>, seed: Accumulator) -> Self {
    Self {
      operation,
      entries,
      seed,
    }
  }

  pub fn operation(&self) -> &str {
    &self.operation
  }

  /// Number of entries known before the walk starts (seed entries excluded).
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn seed(&self) -> &Accumulator {
    &self.seed
  }

  /// Evaluates every entry in order, depth first: a splice is replaced in place by
  /// the entries it produces, ahead of everything declared after it.
  ///
  /// Stops at the first failing step. Executors call this between beginning and
  /// committing (or rolling back) their transaction.
  #[instrument(
    name = "Script::execute",
    skip_all,
    fields(operation = %self.operation, entries = self.entries.len(), seeded = self.seed.len()),
    err(Display)
  )]
  pub async fn execute(self) -> Result<Execution, ExecutionError> {
    let operation = self.operation;
    let mut queue: VecDeque<Entry> = self.entries.into();
    let mut results = self.seed;
    let mut seen: HashSet<StepKey> = results.keys().cloned().collect();
    let mut after_commit = Vec::new();

    while let Some(entry) = queue.pop_front() {
      match entry {
        Entry::Step { key, run } => {
          if !seen.insert(key.clone()) {
            return Err(
              ContractViolation::DuplicateName {
                operation: operation.to_string(),
                scope: key.scope().clone(),
                name: key.name().to_string(),
              }
              .into(),
            );
          }

          event!(Level::TRACE, step = %key, "Evaluating step.");
          let view = results.to_tree(key.scope());
          match guarded(async move { run(view).await }).await {
            Ok(Ok(value)) => results.push(key, value),
            Ok(Err(reason)) => {
              event!(Level::WARN, step = %key, %reason, "Step failed.");
              return Err(ExecutionError::StepFailed {
                key,
                reason,
                partial: results,
              });
            }
            Err(message) => {
              event!(Level::ERROR, step = %key, %message, "Step panicked.");
              return Err(
                ContractViolation::StepEvaluation {
                  operation: operation.to_string(),
                  step: key,
                  accumulator: results,
                  message,
                }
                .into(),
              );
            }
          }
        }
        Entry::Splice { scope, label, expand } => match expand(&results) {
          Ok(spliced) => {
            event!(Level::DEBUG, %scope, %label, spliced = spliced.len(), "Splicing entries.");
            for e in spliced.into_iter().rev() {
              queue.push_front(e);
            }
          }
          Err(SpliceError::Failed { key, reason }) => {
            event!(Level::WARN, step = %key, %reason, "Splice failed.");
            return Err(ExecutionError::StepFailed {
              key,
              reason,
              partial: results,
            });
          }
          Err(SpliceError::Contract(violation)) => return Err(violation.into()),
        },
        Entry::AfterCommit(task) => after_commit.push(task),
      }
    }

    event!(Level::DEBUG, completed = results.len(), "Script completed.");
    Ok(Execution { results, after_commit })
  }
}

impl std::fmt::Debug for Script {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Script")
      .field("operation", &self.operation)
      .field("entries", &self.entries)
      .field("seed", &self.seed)
      .finish()
  }
}
