//! Watermark trigger integration tests.
//!
//! Every test drives the trigger through a `MemoryStore` transaction and
//! commits between steps where the step would be its own unit of work in an
//! operator, so trigger state is also checked across commit boundaries.

use tidal_execution::{fire_ready_keys, ExecutionError, Trigger, Value, WatermarkTrigger};
use tidal_storage::{Context, MemoryStore, MemoryTransaction, StateError, StateStore};
use time::macros::datetime;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

fn at(secs: i64) -> OffsetDateTime {
    datetime!(2024-01-01 0:00 UTC) + time::Duration::seconds(secs)
}

fn key(name: &str) -> Value {
    Value::from(name)
}

struct Harness {
    store: MemoryStore,
    trigger: WatermarkTrigger,
    ctx: Context,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self {
            store: MemoryStore::new(),
            trigger: WatermarkTrigger::default(),
            ctx: Context::background(),
        }
    }

    async fn record(&self, k: &str, t: OffsetDateTime) {
        let mut tx = self.store.begin().await.unwrap();
        self.trigger
            .record_received(&self.ctx, &mut tx, &key(k), t)
            .await
            .unwrap();
        self.store.commit(tx).await.unwrap();
    }

    async fn watermark(&self, t: OffsetDateTime) {
        let mut tx = self.store.begin().await.unwrap();
        self.trigger
            .update_watermark(&self.ctx, &mut tx, t)
            .await
            .unwrap();
        self.store.commit(tx).await.unwrap();
    }

    async fn poll(&self) -> Result<Value, ExecutionError> {
        let mut tx = self.store.begin().await.unwrap();
        let polled = self.trigger.poll_key_to_fire(&self.ctx, &mut tx).await;
        self.store.commit(tx).await.unwrap();
        polled
    }
}

fn is_no_key(result: &Result<Value, ExecutionError>) -> bool {
    matches!(result, Err(ExecutionError::NoKeyToFire))
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn watermark_behind_event_time_fires_nothing() {
    let h = Harness::new();
    h.record("A", at(10)).await;
    h.watermark(at(5)).await;
    assert!(is_no_key(&h.poll().await));
}

#[tokio::test]
async fn watermark_at_event_time_fires_once() {
    let h = Harness::new();
    h.record("A", at(10)).await;
    h.watermark(at(10)).await;
    assert_eq!(h.poll().await.unwrap(), key("A"));
    assert!(is_no_key(&h.poll().await));
}

#[tokio::test]
async fn keys_fire_as_watermark_passes_them() {
    let h = Harness::new();
    h.record("A", at(5)).await;
    h.record("B", at(8)).await;

    h.watermark(at(6)).await;
    assert_eq!(h.poll().await.unwrap(), key("A"));
    assert!(is_no_key(&h.poll().await));

    h.watermark(at(9)).await;
    assert_eq!(h.poll().await.unwrap(), key("B"));
    assert!(is_no_key(&h.poll().await));
}

#[tokio::test]
async fn late_record_is_never_scheduled() {
    let h = Harness::new();
    h.watermark(at(10)).await;
    h.record("A", at(3)).await;
    assert!(is_no_key(&h.poll().await));
    h.watermark(at(1_000)).await;
    assert!(is_no_key(&h.poll().await));
}

// ── Additional behavior ─────────────────────────────────────────────────────

#[tokio::test]
async fn ready_keys_fire_in_time_order() {
    let h = Harness::new();
    for (k, t) in [("C", 30), ("A", 10), ("D", 40), ("B", 20)] {
        h.record(k, at(t)).await;
    }
    h.watermark(at(35)).await;
    let mut order = Vec::new();
    while let Ok(k) = h.poll().await {
        order.push(k);
    }
    assert_eq!(order, vec![key("A"), key("B"), key("C")]);

    h.watermark(at(40)).await;
    assert_eq!(h.poll().await.unwrap(), key("D"));
}

#[tokio::test]
async fn fire_ready_keys_drains_and_counts() {
    let h = Harness::new();
    let mut tx = h.store.begin().await.unwrap();
    for (k, t) in [("A", 1), ("B", 2), ("C", 50)] {
        h.trigger
            .record_received(&h.ctx, &mut tx, &key(k), at(t))
            .await
            .unwrap();
    }
    h.trigger
        .update_watermark(&h.ctx, &mut tx, at(10))
        .await
        .unwrap();

    let mut emitted = Vec::new();
    let fired = fire_ready_keys(&h.trigger, &h.ctx, &mut tx, |k| {
        emitted.push(k.clone());
        Ok(())
    })
    .await
    .unwrap();
    h.store.commit(tx).await.unwrap();

    assert_eq!(fired, 2);
    assert_eq!(emitted, vec![key("A"), key("B")]);
}

#[tokio::test]
async fn fire_ready_keys_works_through_trait_object() {
    let h = Harness::new();
    let trigger: Box<dyn Trigger<MemoryTransaction>> = Box::new(WatermarkTrigger::default());
    let mut tx = h.store.begin().await.unwrap();
    trigger
        .record_received(&h.ctx, &mut tx, &key("A"), at(1))
        .await
        .unwrap();
    trigger.update_watermark(&h.ctx, &mut tx, at(1)).await.unwrap();
    let fired = fire_ready_keys(trigger.as_ref(), &h.ctx, &mut tx, |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(fired, 1);
}

#[tokio::test]
async fn aborted_transaction_leaves_trigger_unchanged() {
    let h = Harness::new();
    h.record("A", at(1)).await;
    h.watermark(at(5)).await;

    let mut tx = h.store.begin().await.unwrap();
    assert_eq!(
        h.trigger.poll_key_to_fire(&h.ctx, &mut tx).await.unwrap(),
        key("A")
    );
    h.store.abort(tx).await.unwrap();

    assert_eq!(h.poll().await.unwrap(), key("A"));
}

#[tokio::test]
async fn concurrent_polls_fire_a_key_once() {
    let h = Harness::new();
    h.record("A", at(1)).await;
    h.watermark(at(5)).await;

    let mut first = h.store.begin().await.unwrap();
    let mut second = h.store.begin().await.unwrap();
    let a = h.trigger.poll_key_to_fire(&h.ctx, &mut first).await.unwrap();
    let b = h.trigger.poll_key_to_fire(&h.ctx, &mut second).await.unwrap();
    assert_eq!(a, b);

    h.store.commit(first).await.unwrap();
    assert!(matches!(
        h.store.commit(second).await,
        Err(StateError::Conflict { .. })
    ));
    assert!(is_no_key(&h.poll().await));
}

#[tokio::test]
async fn tuple_keys_round_trip_through_the_index() {
    let h = Harness::new();
    let composite = Value::Tuple(vec![Value::Int(7), Value::from("eu-west")]);
    let mut tx = h.store.begin().await.unwrap();
    h.trigger
        .record_received(&h.ctx, &mut tx, &composite, at(3))
        .await
        .unwrap();
    h.trigger
        .update_watermark(&h.ctx, &mut tx, at(3))
        .await
        .unwrap();
    assert_eq!(
        h.trigger.poll_key_to_fire(&h.ctx, &mut tx).await.unwrap(),
        composite
    );
}
