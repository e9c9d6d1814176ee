// tests/pipeline_execution_tests.rs
mod common; // Reference the common module

use common::*;
use opkit::{Context, Engine, MemoryStore, Pipeline, ResultTree};
use serde::Deserialize;
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;

fn linear() -> TestOp {
  TestOp::new("linear", |p: Pipeline| {
    p.step("a", |_| async { Ok(json!(1)) }).step("b", |tree: ResultTree| async move {
      let a = tree.value("a").and_then(Value::as_i64).unwrap_or_default();
      Ok(json!(a + 1))
    })
  })
}

#[tokio::test]
async fn test_steps_run_in_order_and_see_earlier_results() {
  setup_tracing();
  let tree = Engine::inline().run(&linear(), Context::new(), json!({})).await.unwrap();

  assert_eq!(tree.into_value(), json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_empty_operation_returns_empty_tree() {
  setup_tracing();
  let op = TestOp::new("noop", |p| p);
  let tree = Engine::inline().run(&op, Context::new(), Value::Null).await.unwrap();

  assert!(tree.is_empty());
}

#[tokio::test]
async fn test_build_exposes_declared_keys_without_running() {
  setup_tracing();
  let pipeline = Engine::inline().build(&linear(), Context::new(), json!({})).unwrap();

  assert!(pipeline.is_root());
  assert!(pipeline.scope().is_root());
  assert_eq!(pipeline.operation(), "linear");
  let names: Vec<&str> = pipeline.keys().iter().map(|k| k.name()).collect();
  assert_eq!(names, vec!["a", "b"]);
  assert!(pipeline.keys().iter().all(|k| k.scope() == pipeline.scope()));
}

#[tokio::test]
async fn test_each_run_gets_a_fresh_root_scope() {
  setup_tracing();
  let engine = Engine::inline();
  let first = engine.build(&linear(), Context::new(), json!({})).unwrap();
  let second = engine.build(&linear(), Context::new(), json!({})).unwrap();

  assert_ne!(first.scope(), second.scope());
}

#[derive(Deserialize)]
struct Greeting {
  name: String,
  times: usize,
}

#[tokio::test]
async fn test_steps_read_validated_params_and_context() {
  setup_tracing();
  let op = TestOp::new("greet", |p| {
    let args: Greeting = p.params().decode().unwrap();
    let locale = p.context().get("locale").cloned().unwrap_or(Value::Null);
    p.step("greeting", move |_| {
      let text = vec![format!("hi {}", args.name); args.times].join(" ");
      let locale = locale.clone();
      async move { Ok(json!({"text": text, "locale": locale})) }
    })
  })
  .requiring(&["name", "times"]);

  let context = Context::from(json!({"locale": "en"}));
  let tree = Engine::inline()
    .run(&op, context, json!({"name": "ada", "times": 2}))
    .await
    .unwrap();

  assert_eq!(tree.value("greeting").unwrap(), &json!({"text": "hi ada hi ada", "locale": "en"}));
}

#[tokio::test]
#[serial]
async fn test_memory_store_commits_successful_scripts() {
  setup_tracing();
  reset_counters();
  let store = Arc::new(MemoryStore::new());
  let writer = store.clone();
  let op = TestOp::new("create_user", move |p| {
    let store = writer.clone();
    let name = p.params().get("name").cloned().unwrap_or(Value::Null);
    p.step("user", move |_| {
      let store = store.clone();
      let entity = json!({"id": 1, "name": name.clone()});
      async move { store.insert("users", entity).map_err(|e| json!(e.to_string())) }
    })
    .step("audit", counted)
  })
  .requiring(&["name"]);

  let tree = Engine::memory(store.clone())
    .run(&op, Context::new(), json!({"name": "ada"}))
    .await
    .unwrap();

  assert_eq!(tree.value("user").unwrap()["name"], json!("ada"));
  assert_eq!(store.count("users"), 1);
  assert_eq!(step_count(), 1);
}

#[tokio::test]
async fn test_result_tree_decodes_into_typed_values() {
  setup_tracing();
  #[derive(Deserialize, Debug, PartialEq)]
  struct Point {
    x: i64,
    y: i64,
  }

  let op = TestOp::new("point", |p| p.step("point", |_| async { Ok(json!({"x": 1, "y": 2})) }));
  let tree = Engine::inline().run(&op, Context::new(), json!({})).await.unwrap();

  let point: Point = tree.decode("point").unwrap().unwrap();
  assert_eq!(point, Point { x: 1, y: 2 });
  assert!(tree.decode::<Point>("missing").is_none());
}
