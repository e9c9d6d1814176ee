// opkit/src/executor.rs

//! Defines the `TransactionExecutor` seam between the composition core and
//! whatever persistent store commits the work.

use crate::error::ExecutionError;
use crate::pipeline::execution::{Execution, Script};
use async_trait::async_trait;
use tracing::{event, instrument, Level};

/// Runs a whole script as one atomic unit.
///
/// Implementations begin a transaction, call [`Script::execute`], then commit on
/// `Ok` and roll back on any `Err`. Failures of the executor itself are reported
/// as [`ExecutionError::Executor`]; a step failure or contract violation coming
/// out of the script must be passed through unchanged.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
  async fn transaction(&self, script: Script) -> Result<Execution, ExecutionError>;
}

/// Runs scripts with no isolation and nothing to roll back. Useful for
/// operations whose steps have no side effects of their own, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

#[async_trait]
impl TransactionExecutor for InlineExecutor {
  #[instrument(name = "InlineExecutor::transaction", skip_all, fields(operation = %script.operation()))]
  async fn transaction(&self, script: Script) -> Result<Execution, ExecutionError> {
    let outcome = script.execute().await;
    if let Err(e) = &outcome {
      event!(Level::DEBUG, error = %e, "Inline script ended without commit; nothing to roll back.");
    }
    outcome
  }
}
