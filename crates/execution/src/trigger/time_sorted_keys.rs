//! An index of keys ordered by a per-key time, stored in a transaction.
//!
//! Two regions live under the index's transaction:
//!
//! - `t/<time><key>` with an empty value, one entry per scheduled key. The
//!   time is encoded so that byte order equals time order, which makes the
//!   first entry under `t/` the minimum.
//! - `k/<key>` holding the encoded time of that key's entry, so a key is
//!   scheduled at most once and stale deletes can be detected.
//!
//! Keys are the JSON serialization of [`Value::canonical`], so keys that
//! compare equal share one entry. Entries with equal times are ordered by
//! the bytes of that encoding. Keys come back from the index in canonical
//! form.

use time::OffsetDateTime;
use tidal_storage::{StateError, StateTransaction};
use tracing::trace;

use crate::error::{state_err, ExecutionError};
use crate::value::Value;

const BY_TIME: &[u8] = b"t/";
const BY_KEY: &[u8] = b"k/";
const TIME_LEN: usize = 16;
const SIGN_BIT: u128 = 1 << 127;

pub struct TimeSortedKeys<S> {
    tx: S,
}

impl<S: StateTransaction> TimeSortedKeys<S> {
    pub fn new(tx: S) -> Self {
        Self { tx }
    }

    /// Schedules `key` at `time`, replacing any earlier schedule for `key`.
    pub async fn update(&mut self, key: &Value, time: OffsetDateTime) -> Result<(), ExecutionError> {
        let key_bytes = encode_key(key)?;
        let by_key = by_key_entry(&key_bytes);
        let previous = self
            .tx
            .get(&by_key)
            .await
            .map_err(state_err("couldn't read key's scheduled time"))?;
        if let Some(previous) = previous {
            self.tx
                .delete(&by_time_entry(&previous, &key_bytes))
                .await
                .map_err(state_err("couldn't remove previous schedule"))?;
        }

        let time_bytes = encode_time(time);
        self.tx
            .set(&by_time_entry(&time_bytes, &key_bytes), &[])
            .await
            .map_err(state_err("couldn't insert time index entry"))?;
        self.tx
            .set(&by_key, &time_bytes)
            .await
            .map_err(state_err("couldn't record key's scheduled time"))
    }

    /// The entry with the smallest time, [`ExecutionError::NotFound`] when
    /// the index is empty.
    pub async fn get_first(&mut self) -> Result<(Value, OffsetDateTime), ExecutionError> {
        let (entry, _) = self
            .tx
            .first_with_prefix(BY_TIME)
            .await
            .map_err(state_err("couldn't scan time index"))?
            .ok_or(ExecutionError::NotFound)?;
        let rest = &entry[BY_TIME.len()..];
        if rest.len() < TIME_LEN {
            return Err(state_err("couldn't decode time index entry")(StateError::Codec(
                format!("entry of {} bytes is shorter than its time prefix", rest.len()),
            )));
        }
        let (time_bytes, key_bytes) = rest.split_at(TIME_LEN);
        let time = decode_time(time_bytes).map_err(state_err("couldn't decode entry time"))?;
        let key = serde_json::from_slice(key_bytes)
            .map_err(|e| state_err("couldn't decode entry key")(e.into()))?;
        Ok((key, time))
    }

    /// Removes `key`'s entry if it is scheduled at exactly `time`. An entry
    /// at any other time was rescheduled since it was read and is kept.
    pub async fn delete(&mut self, key: &Value, time: OffsetDateTime) -> Result<(), ExecutionError> {
        let key_bytes = encode_key(key)?;
        let by_key = by_key_entry(&key_bytes);
        let time_bytes = encode_time(time);
        let stored = self
            .tx
            .get(&by_key)
            .await
            .map_err(state_err("couldn't read key's scheduled time"))?;
        if stored.as_deref() != Some(time_bytes.as_slice()) {
            trace!(key = %key, time = %time, "stale time index delete ignored");
            return Ok(());
        }
        self.tx
            .delete(&by_time_entry(&time_bytes, &key_bytes))
            .await
            .map_err(state_err("couldn't delete time index entry"))?;
        self.tx
            .delete(&by_key)
            .await
            .map_err(state_err("couldn't delete key's scheduled time"))
    }
}

fn encode_key(key: &Value) -> Result<Vec<u8>, ExecutionError> {
    serde_json::to_vec(&key.canonical()).map_err(|e| state_err("couldn't encode key")(e.into()))
}

fn by_key_entry(key: &[u8]) -> Vec<u8> {
    [BY_KEY, key].concat()
}

fn by_time_entry(time: &[u8], key: &[u8]) -> Vec<u8> {
    [BY_TIME, time, key].concat()
}

/// Nanoseconds since the epoch with the sign bit flipped, big-endian, so
/// unsigned byte order matches signed time order.
fn encode_time(time: OffsetDateTime) -> [u8; TIME_LEN] {
    ((time.unix_timestamp_nanos() as u128) ^ SIGN_BIT).to_be_bytes()
}

fn decode_time(bytes: &[u8]) -> Result<OffsetDateTime, StateError> {
    let raw: [u8; TIME_LEN] = bytes
        .try_into()
        .map_err(|_| StateError::Codec(format!("time must be {} bytes", TIME_LEN)))?;
    let nanos = (u128::from_be_bytes(raw) ^ SIGN_BIT) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|e| StateError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tidal_storage::{MemoryStore, StateStore};
    use time::macros::datetime;

    #[test]
    fn time_encoding_preserves_order() {
        let times = [
            datetime!(1900-01-01 0:00 UTC),
            datetime!(1969-12-31 23:59:59.999999999 UTC),
            datetime!(1970-01-01 0:00 UTC),
            datetime!(1970-01-01 0:00:00.000000001 UTC),
            datetime!(2024-06-01 12:00 UTC),
        ];
        for pair in times.windows(2) {
            assert!(encode_time(pair[0]) < encode_time(pair[1]));
        }
        for t in times {
            assert_eq!(decode_time(&encode_time(t)).unwrap(), t);
        }
    }

    #[test]
    fn offsets_compare_by_instant() {
        let utc = datetime!(2024-06-01 12:00 UTC);
        let plus_two = datetime!(2024-06-01 14:00 +02:00);
        assert_eq!(encode_time(utc), encode_time(plus_two));
    }

    #[tokio::test]
    async fn empty_index_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        assert!(matches!(
            index.get_first().await,
            Err(ExecutionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn get_first_returns_minimum_time() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        index
            .update(&"b".into(), datetime!(2024-01-01 0:00:08 UTC))
            .await
            .unwrap();
        index
            .update(&"a".into(), datetime!(2024-01-01 0:00:05 UTC))
            .await
            .unwrap();
        index
            .update(&"c".into(), datetime!(2024-01-01 0:00:09 UTC))
            .await
            .unwrap();
        let (key, time) = index.get_first().await.unwrap();
        assert_eq!(key, Value::from("a"));
        assert_eq!(time, datetime!(2024-01-01 0:00:05 UTC));
    }

    #[tokio::test]
    async fn update_replaces_previous_schedule() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        let early = datetime!(2024-01-01 0:00:01 UTC);
        let late = datetime!(2024-01-01 0:00:20 UTC);
        index.update(&"a".into(), early).await.unwrap();
        index
            .update(&"b".into(), datetime!(2024-01-01 0:00:10 UTC))
            .await
            .unwrap();
        index.update(&"a".into(), late).await.unwrap();

        let (key, _) = index.get_first().await.unwrap();
        assert_eq!(key, Value::from("b"));
        index
            .delete(&"b".into(), datetime!(2024-01-01 0:00:10 UTC))
            .await
            .unwrap();
        assert_eq!(index.get_first().await.unwrap(), (Value::from("a"), late));
        index.delete(&"a".into(), late).await.unwrap();
        assert!(matches!(
            index.get_first().await,
            Err(ExecutionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn stale_delete_is_a_no_op() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        let first = datetime!(2024-01-01 0:00:01 UTC);
        let second = datetime!(2024-01-01 0:00:02 UTC);
        index.update(&"a".into(), first).await.unwrap();
        index.update(&"a".into(), second).await.unwrap();
        index.delete(&"a".into(), first).await.unwrap();
        assert_eq!(index.get_first().await.unwrap(), (Value::from("a"), second));
    }

    #[tokio::test]
    async fn equal_keys_with_different_encodings_share_one_entry() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        let early = datetime!(2024-01-01 0:00:05 UTC);
        let late = datetime!(2024-01-01 0:00:20 UTC);

        index
            .update(&Value::Decimal(Decimal::new(10, 1)), early)
            .await
            .unwrap();
        index
            .update(&Value::Decimal(Decimal::new(100, 2)), late)
            .await
            .unwrap();
        let (key, time) = index.get_first().await.unwrap();
        assert_eq!(key, Value::Decimal(Decimal::ONE));
        assert_eq!(time, late);

        let noon = Value::Time(datetime!(2024-06-01 12:00 UTC));
        let same_instant = Value::Time(datetime!(2024-06-01 14:00 +02:00));
        index.update(&noon, early).await.unwrap();
        index.delete(&same_instant, early).await.unwrap();
        assert_eq!(index.get_first().await.unwrap().0, Value::Decimal(Decimal::ONE));
    }

    #[tokio::test]
    async fn equal_times_break_ties_by_key_bytes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut index = TimeSortedKeys::new(tx.with_prefix(b"idx/"));
        let t = datetime!(2024-01-01 0:00 UTC);
        let b = Value::Tuple(vec![Value::Int(2)]);
        let a = Value::Tuple(vec![Value::Int(1)]);
        index.update(&b, t).await.unwrap();
        index.update(&a, t).await.unwrap();
        assert_eq!(index.get_first().await.unwrap().0, a);
    }
}
