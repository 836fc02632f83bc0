/// All errors that can be returned by a state store or a transaction on it.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// No value is stored under the requested key.
    ///
    /// This is an expected outcome for optional state and callers usually
    /// default it rather than propagate it.
    #[error("not found")]
    NotFound,

    /// Optimistic concurrency control conflict: another transaction committed
    /// a change to a key this transaction read, wrote, or scanned.
    #[error("transaction conflict on key {key:?}")]
    Conflict { key: Vec<u8> },

    /// A stored value could not be encoded or decoded.
    #[error("state codec error: {0}")]
    Codec(String),

    /// The caller's context was cancelled while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,

    /// A backend-specific error (poisoned lock, I/O, etc.).
    #[error("state backend error: {0}")]
    Backend(String),
}

impl StateError {
    /// Returns `true` for [`StateError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound)
    }
}

/// Marker error produced when a [`Context`](crate::Context) is cancelled.
///
/// Error types that want to be usable with [`Context::run`](crate::Context::run)
/// implement `From<Cancelled>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for StateError {
    fn from(_: Cancelled) -> Self {
        StateError::Cancelled
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Codec(e.to_string())
    }
}
