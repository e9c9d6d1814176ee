// opkit/examples/basic_operation.rs

use opkit::{Changeset, Context, Engine, Lookup, MemoryStore, Operation, Pipeline, ResultTree, RunError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// 1. An operation: rename a user, then record the change.
struct RenameUser {
  store: Arc<MemoryStore>,
}

impl Operation for RenameUser {
  fn name(&self) -> &str {
    "rename_user"
  }

  // 2. Validate raw parameters before anything is built.
  fn changeset(&self, changeset: Changeset) -> Changeset {
    changeset
      .validate_required(&["id", "name"])
      .validate_with("name", |v| match v.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err("must be a non-empty string".to_string()),
      })
  }

  // 3. Declare the steps. Each one sees the results of the steps before it.
  fn define(&self, pipeline: Pipeline) -> Pipeline {
    let name = pipeline.params().get("name").cloned().unwrap_or(Value::Null);
    let store = self.store.clone();

    pipeline
      .lookup("user", Lookup::new("users"))
      .step("renamed", move |tree: ResultTree| {
        let store = store.clone();
        let name = name.clone();
        async move {
          let mut user = tree.value("user").cloned().unwrap_or(Value::Null);
          user["name"] = name;
          store.insert("users", user).map_err(|e| json!({"error": e.to_string()}))
        }
      })
      .after_commit(|mut tree: ResultTree| async move {
        // Runs only once the rename is committed.
        info!("Sending rename notification.");
        tree.insert_value("notified", json!(true));
        Ok(tree)
      })
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize tracing (RUST_LOG=opkit=debug shows phase transitions)
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  info!("--- Basic Operation Example ---");

  let store = Arc::new(MemoryStore::new());
  store.insert("users", json!({"id": 1, "name": "Ada"}))?;
  let engine = Engine::memory(store.clone());
  let op = RenameUser { store: store.clone() };

  // 4. A successful run returns the nested result tree.
  let tree = engine.run(&op, Context::new(), json!({"id": 1, "name": "Ada Lovelace"})).await?;
  info!("Result: {}", tree.clone().into_value());
  assert_eq!(store.find("users", &json!(1)).map(|u| u["name"].clone()), Some(json!("Ada Lovelace")));

  // 5. Failures come back as values describing what went wrong.
  match engine.run(&op, Context::new(), json!({"id": 1, "name": "  "})).await {
    Err(RunError::ParameterInvalid(diagnostic)) => info!("Rejected parameters: {}", diagnostic),
    other => anyhow::bail!("expected a parameter error, got {:?}", other),
  }

  match engine.run(&op, Context::new(), json!({"id": 42, "name": "Nobody"})).await {
    Err(RunError::StepFailed { key, reason, .. }) => info!("Step '{}' failed: {}", key.name(), reason),
    other => anyhow::bail!("expected a step failure, got {:?}", other),
  }

  info!("--- Basic Operation Example Complete ---");
  Ok(())
}
