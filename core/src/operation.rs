// opkit/src/operation.rs

//! The `Operation` trait application code implements, and the shared helpers that
//! validate parameters and run a definition for one scope.

use crate::core::params::{Changeset, Diagnostic, Params};
use crate::core::step::guarded_sync;
use crate::error::ContractViolation;
use crate::pipeline::definition::{Frame, Pipeline};
use serde_json::Value;
use tracing::{event, Level};

/// A named, declarative multi-step business operation.
///
/// `define` receives an empty pipeline for the operation's scope and returns it
/// with steps, embedded operations, deferred extensions and callbacks declared.
/// It must return the pipeline it was given (or one derived from it through DSL
/// calls), never a pipeline from another scope.
pub trait Operation: Send + Sync + 'static {
  /// Identity used in logs and contract-violation diagnostics.
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }

  /// Parameter validation hook. The default accepts any object.
  fn changeset(&self, changeset: Changeset) -> Changeset {
    changeset
  }

  fn define(&self, pipeline: Pipeline) -> Pipeline;
}

pub(crate) fn validate(operation: &dyn Operation, raw: Value) -> Result<Params, Diagnostic> {
  operation.changeset(Changeset::cast(raw)).apply()
}

/// Runs `operation.define` on an empty pipeline at `frame`. A panicking definition
/// or one that returns a pipeline for another scope is a contract violation. A
/// violation recorded by the DSL is left on the returned pipeline.
pub(crate) fn define_in(operation: &dyn Operation, frame: Frame) -> Result<Pipeline, ContractViolation> {
  let expected = frame.scope.clone();
  let built = guarded_sync(|| operation.define(Pipeline::new(frame))).map_err(|message| {
    ContractViolation::DefinitionFault {
      operation: operation.name().to_string(),
      scope: expected.clone(),
      message,
    }
  })?;

  if built.scope() != &expected {
    return Err(ContractViolation::ScopeMismatch {
      operation: operation.name().to_string(),
      expected,
      found: built.scope().clone(),
    });
  }
  event!(Level::TRACE, operation = %operation.name(), scope = %expected, entries = built.len(), "Scope defined.");
  Ok(built)
}
