//! A single typed scalar stored in its own region of a transaction.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StateError;
use crate::traits::StateTransaction;

/// A typed value occupying the empty key of a (usually prefix-scoped)
/// transaction. Values are encoded as JSON.
///
/// ```ignore
/// let mut watermark = ValueState::<_, i64>::new(tx.with_prefix(b"$watermark$"));
/// match watermark.get().await {
///     Ok(w) => println!("watermark {w}"),
///     Err(StateError::NotFound) => println!("no watermark yet"),
///     Err(e) => return Err(e),
/// }
/// ```
pub struct ValueState<S, V> {
    tx: S,
    _value: PhantomData<fn() -> V>,
}

impl<S, V> ValueState<S, V>
where
    S: StateTransaction,
    V: Serialize + DeserializeOwned,
{
    pub fn new(tx: S) -> Self {
        Self {
            tx,
            _value: PhantomData,
        }
    }

    /// Reads the stored value, `Err(StateError::NotFound)` if never set or
    /// cleared.
    pub async fn get(&mut self) -> Result<V, StateError> {
        let bytes = self.tx.get(&[]).await?.ok_or(StateError::NotFound)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reads the stored value, falling back to `default` when absent.
    pub async fn get_or(&mut self, default: V) -> Result<V, StateError> {
        match self.get().await {
            Err(StateError::NotFound) => Ok(default),
            other => other,
        }
    }

    pub async fn set(&mut self, value: &V) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(value)?;
        self.tx.set(&[], &bytes).await
    }

    pub async fn clear(&mut self) -> Result<(), StateError> {
        self.tx.delete(&[]).await
    }
}
