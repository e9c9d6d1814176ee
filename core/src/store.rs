// opkit/src/store.rs

//! The persistent-store seam used by lookup steps, and `MemoryStore`, an
//! in-process store that can also execute scripts atomically.

use crate::error::ExecutionError;
use crate::executor::TransactionExecutor;
use crate::pipeline::execution::{Execution, Script};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::lock::Mutex as AsyncMutex;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{event, instrument, Level};

/// Read access to persisted entities, keyed by schema (table) and identifier.
#[async_trait]
pub trait EntityStore: Send + Sync {
  /// Loads one entity, `Ok(None)` when it does not exist.
  async fn get(&self, schema: &str, id: &Value) -> Result<Option<Value>>;

  /// Returns `entity` with the named relations loaded into it.
  async fn preload(&self, schema: &str, entity: Value, relations: &[String]) -> Result<Value>;
}

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// Entities held in memory, grouped by schema and keyed by their `id` field.
///
/// As a [`TransactionExecutor`] it runs one script at a time, snapshots its tables
/// before the script starts and restores the snapshot if the script does not
/// complete, so steps that write through the store are all-or-nothing.
///
/// The restore replaces every table wholesale: writes made through [`insert`] or
/// [`remove`] by code outside the script while a failing script runs are lost
/// with it. The transaction lock is not reentrant: a step that runs another
/// operation through the same store waits on itself forever.
///
/// [`insert`]: MemoryStore::insert
/// [`remove`]: MemoryStore::remove
#[derive(Default)]
pub struct MemoryStore {
  tables: RwLock<Tables>,
  transactions: AsyncMutex<()>,
}

/// Identifier as a table key: strings as-is, anything else as its JSON text.
fn id_key(id: &Value) -> String {
  match id {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts or replaces `entity`, which must be an object with a non-null `id`.
  pub fn insert(&self, schema: &str, entity: Value) -> Result<Value> {
    let id = match entity.get("id") {
      Some(id) if !id.is_null() => id_key(id),
      _ => return Err(anyhow!("entity for schema '{}' has no id: {}", schema, entity)),
    };
    self
      .tables
      .write()
      .entry(schema.to_string())
      .or_default()
      .insert(id, entity.clone());
    Ok(entity)
  }

  pub fn remove(&self, schema: &str, id: &Value) -> Option<Value> {
    self.tables.write().get_mut(schema)?.remove(&id_key(id))
  }

  pub fn find(&self, schema: &str, id: &Value) -> Option<Value> {
    self.tables.read().get(schema)?.get(&id_key(id)).cloned()
  }

  /// All entities of `schema`, ordered by identifier.
  pub fn all(&self, schema: &str) -> Vec<Value> {
    self
      .tables
      .read()
      .get(schema)
      .map(|t| t.values().cloned().collect())
      .unwrap_or_default()
  }

  pub fn count(&self, schema: &str) -> usize {
    self.tables.read().get(schema).map_or(0, BTreeMap::len)
  }
}

#[async_trait]
impl EntityStore for MemoryStore {
  async fn get(&self, schema: &str, id: &Value) -> Result<Option<Value>> {
    Ok(self.find(schema, id))
  }

  /// Resolves belongs-to relations: relation `r` follows the entity's `<r>_id`
  /// field into table `r` and stores the result (or null) under field `r`.
  async fn preload(&self, schema: &str, mut entity: Value, relations: &[String]) -> Result<Value> {
    let fields = entity
      .as_object_mut()
      .ok_or_else(|| anyhow!("cannot preload into a non-object entity of schema '{}'", schema))?;
    for relation in relations {
      let related = fields
        .get(&format!("{}_id", relation))
        .filter(|id| !id.is_null())
        .and_then(|id| self.find(relation, id))
        .unwrap_or(Value::Null);
      fields.insert(relation.clone(), related);
    }
    Ok(entity)
  }
}

#[async_trait]
impl TransactionExecutor for MemoryStore {
  #[instrument(name = "MemoryStore::transaction", skip_all, fields(operation = %script.operation()))]
  async fn transaction(&self, script: Script) -> Result<Execution, ExecutionError> {
    let _serialized = self.transactions.lock().await;
    let snapshot = self.tables.read().clone();
    event!(Level::TRACE, "Transaction started.");

    let outcome = script.execute().await;
    match &outcome {
      Ok(execution) => {
        event!(Level::DEBUG, completed = execution.results.len(), "Transaction committed.");
      }
      Err(e) => {
        *self.tables.write() = snapshot;
        event!(Level::WARN, error = %e, "Transaction rolled back.");
      }
    }
    outcome
  }
}
