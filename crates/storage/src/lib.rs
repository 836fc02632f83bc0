//! Transactional state facade for tidal execution.
//!
//! Everything the trigger subsystem persists goes through the traits here:
//! a [`StateStore`] hands out [`StateTransaction`]s, transactions are split
//! into disjoint regions with [`PrefixedTransaction`] views keyed by a
//! [`Namespace`], and single scalars are stored with [`ValueState`].
//! [`Context`] carries cancellation down to the store.

pub mod conformance;
mod context;
mod error;
mod memory;
mod namespace;
mod traits;
mod value_state;

pub use context::{CancelHandle, Context};
pub use error::{Cancelled, StateError};
pub use memory::{MemoryStore, MemoryTransaction};
pub use namespace::Namespace;
pub use traits::{PrefixedTransaction, StateStore, StateTransaction};
pub use value_state::ValueState;
