// opkit/src/compose/source.rs

//! `Source<T>`: a value given up front, or computed from earlier results when the
//! executor reaches the entry that needs it.

use crate::core::params::Context;
use crate::core::tree::ResultTree;
use serde_json::Value;
use std::sync::Arc;

pub enum Source<T> {
  /// Used as-is.
  Literal(T),
  /// Evaluated against the tree visible from the declaring scope, at splice time.
  Computed(Arc<dyn Fn(&ResultTree) -> T + Send + Sync + 'static>),
}

impl<T: Clone> Source<T> {
  pub fn literal(value: T) -> Self {
    Source::Literal(value)
  }

  pub fn computed(f: impl Fn(&ResultTree) -> T + Send + Sync + 'static) -> Self {
    Source::Computed(Arc::new(f))
  }

  pub fn is_computed(&self) -> bool {
    matches!(self, Source::Computed(_))
  }

  pub(crate) fn resolve(&self, view: &ResultTree) -> T {
    match self {
      Source::Literal(value) => value.clone(),
      Source::Computed(f) => f(view),
    }
  }
}

impl<T: Clone> Clone for Source<T> {
  fn clone(&self) -> Self {
    match self {
      Source::Literal(value) => Source::Literal(value.clone()),
      Source::Computed(f) => Source::Computed(f.clone()),
    }
  }
}

impl From<Value> for Source<Value> {
  fn from(value: Value) -> Self {
    Source::Literal(value)
  }
}

impl From<Context> for Source<Context> {
  fn from(context: Context) -> Self {
    Source::Literal(context)
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Source<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Source::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
      Source::Computed(_) => f.write_str("Computed(..)"),
    }
  }
}
