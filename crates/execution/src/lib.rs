//! Execution core for tidal streaming queries.
//!
//! Records flow through operators as changelog [`Record`]s pulled from
//! [`RecordStream`]s. Aggregating operators consult a
//! [`Trigger`](trigger::Trigger) to decide when a grouping key's result is
//! final: the [`WatermarkTrigger`](trigger::WatermarkTrigger) fires a key
//! once the watermark reaches its event time. Trigger state is kept in a
//! [`tidal_storage`] transaction.

pub mod config;
pub mod error;
pub mod record;
pub mod stream;
pub mod trigger;
pub mod value;

pub use config::{ConfigError, TriggerConfig, TriggerNamespaces};
pub use error::{ExecutionError, RecordError};
pub use record::{Metadata, Record, RecordBuilder, RecordId};
pub use stream::{read_all, ChannelStream, InMemoryStream, OneShotLookup, RecordStream};
pub use trigger::{fire_ready_keys, Trigger, WatermarkTrigger};
pub use value::{Value, VariableName, Variables};
