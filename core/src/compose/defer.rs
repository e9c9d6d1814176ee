// opkit/src/compose/defer.rs

//! Conditional extension: deciding part of a scope's script from results that
//! only exist once earlier steps have run.

use crate::core::step::{guarded_sync, Entry, SpliceError, SpliceFn};
use crate::core::tree::{Accumulator, ResultTree};
use crate::error::ContractViolation;
use crate::pipeline::definition::Pipeline;
use std::sync::Arc;

impl Pipeline {
  /// Appends an entry that, when reached, calls `extend` with an empty pipeline for
  /// this same scope and the results visible from it, then runs whatever script
  /// the returned pipeline holds in place of the entry. Returning the pipeline
  /// unchanged adds nothing.
  ///
  /// Steps added by `extend` share this scope's namespace. Pre-transaction
  /// callbacks cannot be registered from it.
  pub fn defer<F>(self, extend: F) -> Self
  where
    F: Fn(Pipeline, &ResultTree) -> Pipeline + Send + Sync + 'static,
  {
    if self.fault().is_some() {
      return self;
    }

    let frame = self.frame.clone();
    let names = self.names();
    let scope = frame.scope.clone();
    let expand: SpliceFn = Arc::new(move |results: &Accumulator| {
      let view = results.to_tree(&frame.scope);
      let seed = Pipeline::extension(frame.clone(), names.clone());
      let extended = guarded_sync(|| extend(seed, &view)).map_err(|message| ContractViolation::DeferEvaluation {
        operation: frame.operation.to_string(),
        scope: frame.scope.clone(),
        accumulator: results.clone(),
        message,
      })?;

      if extended.scope() != &frame.scope {
        return Err(SpliceError::Contract(ContractViolation::ScopeMismatch {
          operation: frame.operation.to_string(),
          expected: frame.scope.clone(),
          found: extended.scope().clone(),
        }));
      }
      let (entries, _) = extended.into_parts()?;
      Ok(entries)
    });

    let mut pipeline = self;
    pipeline.script.push(Entry::Splice {
      scope,
      label: "defer".to_string(),
      expand,
    });
    pipeline
  }
}
