use tidal_storage::{Cancelled, StateError};

/// Errors raised while constructing a [`Record`](crate::Record).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Field names and data values were supplied with different lengths.
    #[error("record has {fields} field names but {values} values")]
    LengthMismatch { fields: usize, values: usize },
}

/// All errors returned by streams and triggers.
///
/// The first four variants are expected control-flow signals and are
/// matched by kind. Everything else is a real failure.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The stream has no more records.
    #[error("end of stream")]
    EndOfStream,

    /// A point lookup found nothing, or an index is empty.
    #[error("not found")]
    NotFound,

    /// The trigger has no key whose event time is at or behind the watermark.
    #[error("no key ready to fire")]
    NoKeyToFire,

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The state store failed; `context` names the operation that was running.
    #[error("{context}: {source}")]
    State {
        context: &'static str,
        #[source]
        source: StateError,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl ExecutionError {
    /// Returns `true` for the expected signals (`EndOfStream`, `NotFound`,
    /// `NoKeyToFire`, `Cancelled`) as opposed to failures.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            ExecutionError::EndOfStream
                | ExecutionError::NotFound
                | ExecutionError::NoKeyToFire
                | ExecutionError::Cancelled
        )
    }
}

impl From<Cancelled> for ExecutionError {
    fn from(_: Cancelled) -> Self {
        ExecutionError::Cancelled
    }
}

/// Map a state store error into an [`ExecutionError`] annotated with the
/// operation that failed. Cancellation reported by the store stays
/// `Cancelled`.
pub(crate) fn state_err(context: &'static str) -> impl Fn(StateError) -> ExecutionError {
    move |e| match e {
        StateError::Cancelled => ExecutionError::Cancelled,
        source => ExecutionError::State { context, source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flow_kinds() {
        assert!(ExecutionError::EndOfStream.is_control_flow());
        assert!(ExecutionError::NoKeyToFire.is_control_flow());
        assert!(!ExecutionError::from(RecordError::LengthMismatch {
            fields: 1,
            values: 2
        })
        .is_control_flow());
    }

    #[test]
    fn state_errors_carry_context() {
        let err = state_err("couldn't get current watermark")(StateError::Backend(
            "disk on fire".into(),
        ));
        assert_eq!(
            err.to_string(),
            "couldn't get current watermark: state backend error: disk on fire"
        );
        assert!(matches!(
            state_err("x")(StateError::Cancelled),
            ExecutionError::Cancelled
        ));
    }
}
