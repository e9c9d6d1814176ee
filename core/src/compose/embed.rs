// opkit/src/compose/embed.rs

//! Embedding: running another operation as a child scope of the current one.
//!
//! The child is not built when the parent is. The parent's script gets a splice
//! entry; when the executor reaches it, the child's parameters and context are
//! resolved against the live results, the child is validated and defined at
//! `parent scope + child id`, and its whole script takes the splice entry's place.

use crate::compose::source::Source;
use crate::core::params::Context;
use crate::core::scope::ScopeId;
use crate::core::step::{guarded_sync, Entry, SpliceError, SpliceFn};
use crate::core::tree::Accumulator;
use crate::error::ContractViolation;
use crate::operation::{define_in, validate, Operation};
use crate::pipeline::definition::{Frame, Pipeline};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{event, Level};

/// Options for [`Pipeline::embed_with`].
#[derive(Clone, Default, Debug)]
pub struct Embed {
  id: Option<ScopeId>,
  context: Option<Source<Context>>,
}

impl Embed {
  pub fn new() -> Self {
    Self::default()
  }

  /// Identifier of the child scope, and so its key in the result tree. Must be
  /// unique among the parent's steps and children. Defaults to a generated id.
  pub fn id(mut self, id: impl Into<ScopeId>) -> Self {
    self.id = Some(id.into());
    self
  }

  /// Replaces the inherited context, either with a literal map or with one
  /// computed from the parent's results at splice time.
  pub fn context(mut self, context: impl Into<Source<Context>>) -> Self {
    self.context = Some(context.into());
    self
  }
}

impl Pipeline {
  /// Embeds `operation` under a generated identifier, inheriting this scope's
  /// context.
  pub fn embed<O: Operation>(self, operation: O, params: impl Into<Source<Value>>) -> Self {
    self.embed_with(operation, params, Embed::new())
  }

  pub fn embed_with<O: Operation>(mut self, operation: O, params: impl Into<Source<Value>>, options: Embed) -> Self {
    let id = options.id.unwrap_or_else(ScopeId::generate);
    if !self.reserve(id.as_str()) {
      return self;
    }

    let operation: Arc<dyn Operation> = Arc::new(operation);
    let label = format!("embed {} as {}", operation.name(), id);
    let child = Child {
      operation,
      parent: self.frame.clone(),
      id,
      params: params.into(),
      context: options.context,
    };
    let scope = self.frame.scope.clone();
    let expand: SpliceFn = Arc::new(move |results: &Accumulator| {
      guarded_sync(|| child.expand(results)).unwrap_or_else(|message| {
        Err(SpliceError::Contract(ContractViolation::DefinitionFault {
          operation: child.operation.name().to_string(),
          scope: child.parent.scope.push(child.id.clone()),
          message,
        }))
      })
    });

    self.script.push(Entry::Splice { scope, label, expand });
    self
  }
}

struct Child {
  operation: Arc<dyn Operation>,
  parent: Frame,
  id: ScopeId,
  params: Source<Value>,
  context: Option<Source<Context>>,
}

impl Child {
  fn expand(&self, results: &Accumulator) -> Result<Vec<Entry>, SpliceError> {
    let view = results.to_tree(&self.parent.scope);
    let raw = self.params.resolve(&view);
    let context = match &self.context {
      Some(source) => source.resolve(&view),
      None => self.parent.context.clone(),
    };

    let params = validate(self.operation.as_ref(), raw).map_err(|diagnostic| {
      event!(Level::WARN, operation = %self.operation.name(), id = %self.id, %diagnostic, "Embedded operation rejected its parameters.");
      SpliceError::Failed {
        key: self.parent.scope.key_for(self.id.as_str()),
        reason: json!({
          "error": "invalid_params",
          "operation": self.operation.name(),
          "errors": diagnostic.to_value(),
        }),
      }
    })?;

    let frame = Frame {
      operation: Arc::from(self.operation.name()),
      scope: self.parent.scope.push(self.id.clone()),
      context,
      params,
      store: self.parent.store.clone(),
    };
    let (entries, _) = define_in(self.operation.as_ref(), frame)?.into_parts()?;
    Ok(entries)
  }
}
