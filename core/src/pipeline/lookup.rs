// opkit/src/pipeline/lookup.rs

//! The entity lookup step: read an identifier from the parameters and load the
//! matching entity from the store.

use crate::core::params::{Context, Params};
use crate::core::step::{step_fn, StepResult};
use crate::error::ContractViolation;
use crate::pipeline::definition::Pipeline;
use crate::store::EntityStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{event, Level};

/// Resolves an entity from the context, given its identifier. Returning `Some`
/// skips the store entirely.
pub type ContextLookup = Arc<dyn Fn(&Context, &Value) -> Option<Value> + Send + Sync + 'static>;

/// Configuration of a [`Pipeline::lookup`] step.
#[derive(Clone)]
pub struct Lookup {
  schema: String,
  path: Vec<String>,
  optional: bool,
  skip_missing: bool,
  preload: Vec<String>,
  from_context: Option<ContextLookup>,
  store: Option<Arc<dyn EntityStore>>,
}

impl Lookup {
  /// Looks up an entity of `schema` by the `id` parameter.
  pub fn new(schema: impl Into<String>) -> Self {
    Self {
      schema: schema.into(),
      path: vec!["id".to_string()],
      optional: false,
      skip_missing: false,
      preload: Vec::new(),
      from_context: None,
      store: None,
    }
  }

  /// Where the identifier lives in the parameters. Must not be empty.
  pub fn path<I, S>(mut self, path: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.path = path.into_iter().map(Into::into).collect();
    self
  }

  /// A missing (or null) identifier yields `null` instead of a failure.
  pub fn optional(mut self, optional: bool) -> Self {
    self.optional = optional;
    self
  }

  /// An entity that does not exist yields `null` instead of a failure.
  pub fn skip_missing(mut self, skip_missing: bool) -> Self {
    self.skip_missing = skip_missing;
    self
  }

  pub fn preload<I, S>(mut self, relations: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.preload = relations.into_iter().map(Into::into).collect();
    self
  }

  pub fn from_context(mut self, f: impl Fn(&Context, &Value) -> Option<Value> + Send + Sync + 'static) -> Self {
    self.from_context = Some(Arc::new(f));
    self
  }

  /// Uses `store` instead of the one the engine provides.
  pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
    self.store = Some(store);
    self
  }

  async fn resolve(&self, store: &dyn EntityStore, params: &Params, context: &Context) -> StepResult {
    let id = match params.get_path(self.path.as_slice()) {
      Some(id) if !id.is_null() => id.clone(),
      _ if self.optional => return Ok(Value::Null),
      _ => return Err(json!({"error": "missing_id", "path": self.path})),
    };

    if let Some(from_context) = &self.from_context {
      if let Some(entity) = from_context(context, &id) {
        event!(Level::TRACE, schema = %self.schema, %id, "Entity resolved from context.");
        return Ok(entity);
      }
    }

    let entity = match store.get(&self.schema, &id).await {
      Ok(Some(entity)) => entity,
      Ok(None) if self.skip_missing => return Ok(Value::Null),
      Ok(None) => return Err(json!({"error": "not_found", "schema": self.schema, "id": id})),
      Err(e) => return Err(store_failure(&e)),
    };

    if self.preload.is_empty() {
      return Ok(entity);
    }
    store
      .preload(&self.schema, entity, &self.preload)
      .await
      .map_err(|e| store_failure(&e))
  }
}

fn store_failure(e: &anyhow::Error) -> Value {
  event!(Level::WARN, error = %e, "Entity store failure during lookup.");
  json!({"error": "store", "message": e.to_string()})
}

impl std::fmt::Debug for Lookup {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Lookup")
      .field("schema", &self.schema)
      .field("path", &self.path)
      .field("optional", &self.optional)
      .field("skip_missing", &self.skip_missing)
      .field("preload", &self.preload)
      .field("from_context", &self.from_context.is_some())
      .field("store_override", &self.store.is_some())
      .finish()
  }
}

impl Pipeline {
  /// Appends a step named `name` that loads one entity as configured by `lookup`.
  pub fn lookup(mut self, name: &str, lookup: Lookup) -> Self {
    if lookup.path.is_empty() {
      let violation = ContractViolation::EmptyLookupPath {
        operation: self.operation().to_string(),
        step: name.to_string(),
      };
      self.record(violation);
      return self;
    }
    let store = match lookup.store.clone().or_else(|| self.store().cloned()) {
      Some(store) => store,
      None => {
        let violation = ContractViolation::StoreUnavailable {
          operation: self.operation().to_string(),
          step: name.to_string(),
        };
        self.record(violation);
        return self;
      }
    };

    let bound = Arc::new((lookup, store, self.params().clone(), self.context().clone()));
    self.push_step(
      name,
      step_fn(move |_| {
        let bound = bound.clone();
        async move {
          let (lookup, store, params, context) = bound.as_ref();
          lookup.resolve(store.as_ref(), params, context).await
        }
      }),
    )
  }
}
