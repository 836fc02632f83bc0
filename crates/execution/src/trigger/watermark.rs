use async_trait::async_trait;
use time::OffsetDateTime;
use tidal_storage::{Context, PrefixedTransaction, StateTransaction, ValueState};
use tracing::{debug, warn};

use super::time_sorted_keys::TimeSortedKeys;
use super::Trigger;
use crate::config::{ConfigError, TriggerConfig, TriggerNamespaces};
use crate::error::{state_err, ExecutionError};
use crate::value::Value;

/// The watermark before any has been set. Every event time is at or after it.
pub const MIN_WATERMARK: OffsetDateTime = time::Date::MIN.midnight().assume_utc();

/// Fires a key once the watermark reaches the event time it was scheduled at.
///
/// All state lives in the caller's transaction under three namespaces (see
/// [`TriggerNamespaces`]):
///
/// - the current watermark,
/// - a time index of scheduled keys,
/// - a cached ready flag, true exactly when the earliest scheduled key is at
///   or behind the watermark.
///
/// Events behind the watermark are late. They are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct WatermarkTrigger {
    namespaces: TriggerNamespaces,
}

impl WatermarkTrigger {
    pub fn new(config: &TriggerConfig) -> Result<Self, ConfigError> {
        Self::with_namespaces(config.namespaces.clone())
    }

    /// Fails if a namespace is empty or one is a prefix of another, since
    /// the trigger's regions would then share keys.
    pub fn with_namespaces(namespaces: TriggerNamespaces) -> Result<Self, ConfigError> {
        namespaces.validate()?;
        Ok(Self { namespaces })
    }

    pub fn namespaces(&self) -> &TriggerNamespaces {
        &self.namespaces
    }

    fn time_keys<'a, T: StateTransaction>(
        &self,
        tx: &'a mut T,
    ) -> TimeSortedKeys<PrefixedTransaction<'a, T>> {
        TimeSortedKeys::new(tx.with_namespace(&self.namespaces.time_sorted_keys))
    }

    async fn watermark<T: StateTransaction>(
        &self,
        tx: &mut T,
    ) -> Result<OffsetDateTime, ExecutionError> {
        ValueState::<_, OffsetDateTime>::new(tx.with_namespace(&self.namespaces.watermark))
            .get_or(MIN_WATERMARK)
            .await
            .map_err(state_err("couldn't get current watermark"))
    }

    async fn ready_flag<T: StateTransaction>(&self, tx: &mut T) -> Result<bool, ExecutionError> {
        ValueState::<_, bool>::new(tx.with_namespace(&self.namespaces.ready_to_fire))
            .get_or(false)
            .await
            .map_err(state_err("couldn't get ready to fire flag"))
    }

    async fn set_ready_flag<T: StateTransaction>(
        &self,
        tx: &mut T,
        ready: bool,
    ) -> Result<(), ExecutionError> {
        ValueState::<_, bool>::new(tx.with_namespace(&self.namespaces.ready_to_fire))
            .set(&ready)
            .await
            .map_err(state_err("couldn't set ready to fire flag"))
    }

    /// Whether the earliest scheduled key is at or behind `watermark`.
    async fn is_something_ready<T: StateTransaction>(
        &self,
        tx: &mut T,
        watermark: OffsetDateTime,
    ) -> Result<bool, ExecutionError> {
        match self.time_keys(tx).get_first().await {
            Ok((_, time)) => Ok(time <= watermark),
            Err(ExecutionError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Persists the ready flag if it differs from `ready`.
    async fn sync_ready_flag<T: StateTransaction>(
        &self,
        tx: &mut T,
        ready: bool,
    ) -> Result<(), ExecutionError> {
        if self.ready_flag(tx).await? != ready {
            self.set_ready_flag(tx, ready).await?;
        }
        Ok(())
    }

    async fn on_record<T: StateTransaction>(
        &self,
        tx: &mut T,
        key: &Value,
        event_time: OffsetDateTime,
    ) -> Result<(), ExecutionError> {
        let watermark = self.watermark(tx).await?;
        if event_time < watermark {
            warn!(
                key = %key,
                event_time = %event_time,
                watermark = %watermark,
                "late record dropped"
            );
            return Ok(());
        }

        self.time_keys(tx)
            .update(key, event_time)
            .await
            .map_err(into_context("couldn't update trigger time for key"))?;

        // Rescheduling may have moved this key's only ready entry past the
        // watermark, so the flag is recomputed rather than only raised.
        let ready = self.is_something_ready(tx, watermark).await?;
        self.sync_ready_flag(tx, ready).await?;
        debug!(key = %key, event_time = %event_time, ready, "key scheduled");
        Ok(())
    }

    async fn on_watermark<T: StateTransaction>(
        &self,
        tx: &mut T,
        watermark: OffsetDateTime,
    ) -> Result<(), ExecutionError> {
        let previous = self.watermark(tx).await?;
        ValueState::<_, OffsetDateTime>::new(tx.with_namespace(&self.namespaces.watermark))
            .set(&watermark)
            .await
            .map_err(state_err("couldn't set new watermark"))?;

        let ready = self.is_something_ready(tx, watermark).await?;
        if watermark < previous {
            warn!(
                watermark = %watermark,
                previous = %previous,
                "watermark moved backwards"
            );
            self.sync_ready_flag(tx, ready).await?;
        } else if ready {
            self.set_ready_flag(tx, true).await?;
        }
        debug!(watermark = %watermark, ready, "watermark updated");
        Ok(())
    }

    async fn on_poll<T: StateTransaction>(&self, tx: &mut T) -> Result<Value, ExecutionError> {
        if !self.ready_flag(tx).await? {
            return Err(ExecutionError::NoKeyToFire);
        }

        let (key, send_time) = match self.time_keys(tx).get_first().await {
            Ok(entry) => entry,
            Err(ExecutionError::NotFound) => {
                panic!("ready to fire flag is set but the trigger time index is empty")
            }
            Err(e) => return Err(into_context("couldn't get first key by time")(e)),
        };
        let watermark = self.watermark(tx).await?;
        if watermark < send_time {
            panic!(
                "ready to fire flag is set but watermark {} is before earliest key time {}",
                watermark, send_time
            );
        }

        self.time_keys(tx)
            .delete(&key, send_time)
            .await
            .map_err(into_context("couldn't delete key from time index"))?;

        if !self.is_something_ready(tx, watermark).await? {
            self.set_ready_flag(tx, false).await?;
        }
        debug!(key = %key, event_time = %send_time, "key ready to fire");
        Ok(key)
    }
}

/// Re-annotates a state failure with the trigger operation it happened in.
fn into_context(context: &'static str) -> impl Fn(ExecutionError) -> ExecutionError {
    move |e| match e {
        ExecutionError::State { source, .. } => ExecutionError::State { context, source },
        other => other,
    }
}

#[async_trait]
impl<T: StateTransaction> Trigger<T> for WatermarkTrigger {
    async fn record_received(
        &self,
        ctx: &Context,
        tx: &mut T,
        key: &Value,
        event_time: OffsetDateTime,
    ) -> Result<(), ExecutionError> {
        ctx.run(self.on_record(tx, key, event_time)).await
    }

    async fn update_watermark(
        &self,
        ctx: &Context,
        tx: &mut T,
        watermark: OffsetDateTime,
    ) -> Result<(), ExecutionError> {
        ctx.run(self.on_watermark(tx, watermark)).await
    }

    async fn poll_key_to_fire(&self, ctx: &Context, tx: &mut T) -> Result<Value, ExecutionError> {
        ctx.run(self.on_poll(tx)).await
    }

    /// Nothing to do: `poll_key_to_fire` already removed the key.
    async fn key_fired(&self, _ctx: &Context, _tx: &mut T, _key: &Value) -> Result<(), ExecutionError> {
        Ok(())
    }
}
