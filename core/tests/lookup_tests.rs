// tests/lookup_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use opkit::{Context, ContractViolation, Embed, Engine, EntityStore, Lookup, MemoryStore, RunError};
use serde_json::{json, Value};
use std::sync::Arc;

fn seeded_store() -> Arc<MemoryStore> {
  let store = Arc::new(MemoryStore::new());
  store.insert("orgs", json!({"id": "acme", "name": "Acme"})).unwrap();
  store.insert("users", json!({"id": 1, "name": "ada", "orgs_id": "acme"})).unwrap();
  store.insert("users", json!({"id": 2, "name": "bob", "orgs_id": null})).unwrap();
  store
}

fn load_user(lookup: Lookup) -> TestOp {
  TestOp::new("load_user", move |p| p.lookup("user", lookup.clone()))
}

#[tokio::test]
async fn test_lookup_loads_entity_by_id_param() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());

  let tree = engine
    .run(&load_user(Lookup::new("users")), Context::new(), json!({"id": 1}))
    .await
    .unwrap();

  assert_eq!(tree.value("user").unwrap()["name"], json!("ada"));
}

#[tokio::test]
async fn test_optional_lookup_with_missing_id_yields_null() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());
  let op = TestOp::new("maybe_user", |p| {
    p.lookup("user", Lookup::new("users").optional(true))
      .step("after", |_| async { Ok(json!("ran")) })
  });

  let tree = engine.run(&op, Context::new(), json!({})).await.unwrap();

  assert_eq!(tree.into_value(), json!({"user": null, "after": "ran"}));
}

#[tokio::test]
async fn test_required_lookup_with_missing_id_fails() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());

  let err = engine
    .run(&load_user(Lookup::new("users")), Context::new(), json!({"id": null}))
    .await
    .unwrap_err();

  assert!(matches!(err, RunError::StepFailed { .. }));
  assert_eq!(err.reason(), Some(&json!({"error": "missing_id", "path": ["id"]})));
}

#[tokio::test]
async fn test_unknown_entity_fails_unless_skipped() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());

  let err = engine
    .run(&load_user(Lookup::new("users")), Context::new(), json!({"id": 99}))
    .await
    .unwrap_err();
  assert_eq!(
    err.reason(),
    Some(&json!({"error": "not_found", "schema": "users", "id": 99}))
  );

  let tree = engine
    .run(&load_user(Lookup::new("users").skip_missing(true)), Context::new(), json!({"id": 99}))
    .await
    .unwrap();
  assert_eq!(tree.value("user"), Some(&Value::Null));
}

#[tokio::test]
async fn test_lookup_follows_a_nested_id_path() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());
  let op = load_user(Lookup::new("users").path(["filter", "user_id"]));

  let tree = engine
    .run(&op, Context::new(), json!({"filter": {"user_id": 2}}))
    .await
    .unwrap();

  assert_eq!(tree.value("user").unwrap()["name"], json!("bob"));
}

#[tokio::test]
async fn test_lookup_preloads_relations() {
  setup_tracing();
  let engine = Engine::memory(seeded_store());
  let op = load_user(Lookup::new("users").preload(["orgs"]));

  let ada = engine.run(&op, Context::new(), json!({"id": 1})).await.unwrap();
  let bob = engine.run(&op, Context::new(), json!({"id": 2})).await.unwrap();

  assert_eq!(ada.value("user").unwrap()["orgs"]["name"], json!("Acme"));
  assert_eq!(bob.value("user").unwrap()["orgs"], Value::Null);
}

#[tokio::test]
async fn test_lookup_prefers_entities_found_in_context() {
  setup_tracing();
  // Empty store: anything not served from the context would be not_found.
  let engine = Engine::memory(Arc::new(MemoryStore::new()));
  let op = load_user(Lookup::new("users").from_context(|ctx, id| {
    ctx.get("current_user").filter(|user| user["id"] == *id).cloned()
  }));
  let context = Context::new().with("current_user", json!({"id": 7, "name": "eve"}));

  let tree = engine.run(&op, context.clone(), json!({"id": 7})).await.unwrap();
  assert_eq!(tree.value("user").unwrap()["name"], json!("eve"));

  let err = engine.run(&op, context, json!({"id": 8})).await.unwrap_err();
  assert_eq!(err.reason().unwrap()["error"], json!("not_found"));
}

#[tokio::test]
async fn test_lookup_store_override_and_child_inheritance() {
  setup_tracing();
  let store = seeded_store();

  // No engine store, but the lookup brings its own.
  let op = load_user(Lookup::new("users").store(store.clone()));
  let tree = Engine::inline().run(&op, Context::new(), json!({"id": 1})).await.unwrap();
  assert_eq!(tree.value("user").unwrap()["id"], json!(1));

  // The engine store reaches lookups declared in embedded children.
  let parent = TestOp::new("parent", |p| {
    p.embed_with(load_user(Lookup::new("users")), json!({"id": 2}), Embed::new().id("child"))
  });
  let tree = Engine::memory(store).run(&parent, Context::new(), json!({})).await.unwrap();
  assert_eq!(tree.scope("child").unwrap().value("user").unwrap()["name"], json!("bob"));
}

#[tokio::test]
async fn test_misconfigured_lookups_are_contract_violations() {
  setup_tracing();

  let err = Engine::memory(seeded_store())
    .run(&load_user(Lookup::new("users").path(Vec::<String>::new())), Context::new(), json!({}))
    .await
    .unwrap_err();
  match err {
    RunError::Contract(ContractViolation::EmptyLookupPath { step, .. }) => assert_eq!(step, "user"),
    other => panic!("Expected EmptyLookupPath, got {:?}", other),
  }

  let err = Engine::inline()
    .run(&load_user(Lookup::new("users")), Context::new(), json!({"id": 1}))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    RunError::Contract(ContractViolation::StoreUnavailable { .. })
  ));
}

struct UnreachableStore;

#[async_trait]
impl EntityStore for UnreachableStore {
  async fn get(&self, _schema: &str, _id: &Value) -> anyhow::Result<Option<Value>> {
    Err(anyhow::anyhow!("connection refused"))
  }

  async fn preload(&self, _schema: &str, entity: Value, _relations: &[String]) -> anyhow::Result<Value> {
    Ok(entity)
  }
}

#[tokio::test]
async fn test_store_errors_become_step_failures() {
  setup_tracing();
  let engine = Engine::inline().with_store(Arc::new(UnreachableStore));

  let err = engine
    .run(&load_user(Lookup::new("users")), Context::new(), json!({"id": 1}))
    .await
    .unwrap_err();

  assert_eq!(
    err.reason(),
    Some(&json!({"error": "store", "message": "connection refused"}))
  );
}
