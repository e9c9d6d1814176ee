// opkit/examples/nested_operations.rs

use opkit::{Context, Embed, Engine, Operation, Pipeline, ResultTree, Source};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

// A child operation: price one order line.
struct PriceLine;

impl Operation for PriceLine {
  fn name(&self) -> &str {
    "price_line"
  }

  fn define(&self, pipeline: Pipeline) -> Pipeline {
    let qty = pipeline.params().get("qty").and_then(Value::as_u64).unwrap_or_default();
    let unit = pipeline.params().get("unit_cents").and_then(Value::as_u64).unwrap_or_default();
    pipeline.step("subtotal", move |_| async move { Ok(json!(qty * unit)) })
  }
}

// The parent: embeds one child per line, then decides on a discount from
// the totals those children produced.
struct PlaceOrder;

impl Operation for PlaceOrder {
  fn name(&self) -> &str {
    "place_order"
  }

  fn define(&self, pipeline: Pipeline) -> Pipeline {
    let lines: Vec<Value> = pipeline
      .params()
      .get("lines")
      .and_then(Value::as_array)
      .cloned()
      .unwrap_or_default();
    let count = lines.len();

    let pipeline = lines.into_iter().enumerate().fold(pipeline, |p, (idx, line)| {
      p.embed_with(PriceLine, line, Embed::new().id(format!("line_{}", idx)))
    });

    pipeline
      .step("total", move |tree: ResultTree| async move {
        let total: u64 = (0..count)
          .filter_map(|idx| tree.scope(&format!("line_{}", idx))?.value("subtotal")?.as_u64())
          .sum();
        Ok(json!(total))
      })
      .defer(|p, tree| {
        let total = tree.value("total").and_then(Value::as_u64).unwrap_or_default();
        if total < 10_000 {
          return p;
        }
        // Large orders get a loyalty voucher, issued as its own nested operation.
        p.embed_with(
          PriceLine,
          Source::computed(|tree: &ResultTree| json!({"qty": 1, "unit_cents": 0, "order_total": tree.value("total")})),
          Embed::new().id("voucher").context(Context::new().with("reason", json!("large order"))),
        )
        .step("discount_cents", move |_| async move { Ok(json!(total / 20)) })
      })
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  info!("--- Nested Operations Example ---");
  let engine = Engine::inline();

  let small = json!({"lines": [{"qty": 2, "unit_cents": 1500}, {"qty": 1, "unit_cents": 999}]});
  let tree = engine.run(&PlaceOrder, Context::new(), small).await?;
  info!("Small order: {}", serde_json::to_string_pretty(&tree)?);

  let large = json!({"lines": [{"qty": 10, "unit_cents": 1500}]});
  let tree = engine.run(&PlaceOrder, Context::new(), large).await?;
  info!("Large order: {}", serde_json::to_string_pretty(&tree)?);
  assert_eq!(tree.value("discount_cents"), Some(&json!(750)));

  info!("--- Nested Operations Example Complete ---");
  Ok(())
}
