//! Triggers decide when a grouping key's aggregate is final and may be
//! emitted downstream.
//!
//! A trigger is driven by three events: a record for a key arrived, the
//! watermark advanced, and the consumer asks which key to fire next. All of
//! its state lives in the transaction the caller passes in, so trigger
//! decisions commit or roll back together with the aggregates they gate.
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! trigger.record_received(&ctx, &mut tx, &key, event_time).await?;
//! trigger.update_watermark(&ctx, &mut tx, watermark).await?;
//! let fired = fire_ready_keys(&trigger, &ctx, &mut tx, |key| emit(key)).await?;
//! store.commit(tx).await?;
//! ```

mod time_sorted_keys;
mod watermark;

pub use time_sorted_keys::TimeSortedKeys;
pub use watermark::{WatermarkTrigger, MIN_WATERMARK};

use async_trait::async_trait;
use time::OffsetDateTime;
use tidal_storage::{Context, StateTransaction};

use crate::error::ExecutionError;
use crate::value::Value;

/// The operations a trigger exposes to the operator that owns it.
#[async_trait]
pub trait Trigger<T: StateTransaction>: Send + Sync {
    /// A record for `key` with the given event time was received.
    async fn record_received(
        &self,
        ctx: &Context,
        tx: &mut T,
        key: &Value,
        event_time: OffsetDateTime,
    ) -> Result<(), ExecutionError>;

    /// The watermark advanced to `watermark`.
    async fn update_watermark(
        &self,
        ctx: &Context,
        tx: &mut T,
        watermark: OffsetDateTime,
    ) -> Result<(), ExecutionError>;

    /// Removes and returns the next key to fire, or
    /// [`ExecutionError::NoKeyToFire`] when none is ready.
    async fn poll_key_to_fire(&self, ctx: &Context, tx: &mut T) -> Result<Value, ExecutionError>;

    /// Acknowledges that the consumer emitted the results for `key`.
    async fn key_fired(&self, ctx: &Context, tx: &mut T, key: &Value) -> Result<(), ExecutionError>;
}

/// Fires every ready key in order.
///
/// For each key `on_fire` is called first, then [`Trigger::key_fired`].
/// Returns how many keys fired. An error from `on_fire` stops the loop and is
/// returned as is; the key it failed on has already been removed, so the
/// caller should abort the transaction.
pub async fn fire_ready_keys<T, Tr, F>(
    trigger: &Tr,
    ctx: &Context,
    tx: &mut T,
    mut on_fire: F,
) -> Result<usize, ExecutionError>
where
    T: StateTransaction,
    Tr: Trigger<T> + ?Sized,
    F: FnMut(&Value) -> Result<(), ExecutionError>,
{
    let mut fired = 0;
    loop {
        let key = match trigger.poll_key_to_fire(ctx, tx).await {
            Ok(key) => key,
            Err(ExecutionError::NoKeyToFire) => return Ok(fired),
            Err(e) => return Err(e),
        };
        on_fire(&key)?;
        trigger.key_fired(ctx, tx, &key).await?;
        fired += 1;
    }
}
