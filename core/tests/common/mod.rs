// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use opkit::{
  Changeset, ExecutionError, Execution, Operation, Pipeline, ResultTree, Script, StepResult, TransactionExecutor,
};
use serde_json::{json, Value};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;

// --- A closure-backed operation for tests ---
type Define = Arc<dyn Fn(Pipeline) -> Pipeline + Send + Sync>;

#[derive(Clone)]
pub struct TestOp {
  name: &'static str,
  required: &'static [&'static str],
  define: Define,
}

impl TestOp {
  pub fn new(name: &'static str, define: impl Fn(Pipeline) -> Pipeline + Send + Sync + 'static) -> Self {
    Self {
      name,
      required: &[],
      define: Arc::new(define),
    }
  }

  /// Rejects parameter sets missing any of `fields`.
  pub fn requiring(mut self, fields: &'static [&'static str]) -> Self {
    self.required = fields;
    self
  }
}

impl Operation for TestOp {
  fn name(&self) -> &str {
    self.name
  }

  fn changeset(&self, changeset: Changeset) -> Changeset {
    changeset.validate_required(self.required)
  }

  fn define(&self, pipeline: Pipeline) -> Pipeline {
    (self.define)(pipeline)
  }
}

/// Child operation used across tests: requires `x`, defines step `double` = 2x.
pub fn doubler() -> TestOp {
  TestOp::new("doubler", |p| {
    let x = p.params().get("x").and_then(Value::as_i64).unwrap_or_default();
    p.step("double", move |_| async move { Ok(json!(x * 2)) })
  })
  .requiring(&["x"])
}

/// Child operation that echoes its `n` parameter as step `result`.
pub fn echo() -> TestOp {
  TestOp::new("echo", |p| {
    let n = p.params().get("n").cloned().unwrap_or(Value::Null);
    p.step("result", move |_| {
      let n = n.clone();
      async move { Ok(n) }
    })
  })
}

// --- Common step bodies ---
pub async fn explode(_: ResultTree) -> StepResult {
  panic!("kaboom")
}

pub async fn counted(_: ResultTree) -> StepResult {
  STEP_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
  Ok(json!("counted"))
}

// --- Executors ---

/// Wraps another executor and counts the scripts it is handed.
pub struct CountingExecutor<E> {
  pub inner: E,
  pub calls: AtomicUsize,
}

impl<E> CountingExecutor<E> {
  pub fn new(inner: E) -> Self {
    Self {
      inner,
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl<E: TransactionExecutor> TransactionExecutor for CountingExecutor<E> {
  async fn transaction(&self, script: Script) -> Result<Execution, ExecutionError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.transaction(script).await
  }
}

/// Refuses every script without running it.
pub struct BrokenExecutor;

#[async_trait]
impl TransactionExecutor for BrokenExecutor {
  async fn transaction(&self, _script: Script) -> Result<Execution, ExecutionError> {
    Err(ExecutionError::Executor(anyhow::anyhow!("disk full")))
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Atomic counters for checking execution counts ---
pub static STEP_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static DEFER_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static CALLBACK_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  STEP_EXEC_COUNTER.store(0, Ordering::SeqCst);
  DEFER_EXEC_COUNTER.store(0, Ordering::SeqCst);
  CALLBACK_EXEC_COUNTER.store(0, Ordering::SeqCst);
}

pub fn step_count() -> usize {
  STEP_EXEC_COUNTER.load(Ordering::SeqCst)
}
