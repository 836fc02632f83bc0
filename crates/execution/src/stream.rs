//! Pull-based record streams.

use std::collections::VecDeque;

use async_trait::async_trait;
use tidal_storage::Context;
use tokio::sync::mpsc;

use crate::error::ExecutionError;
use crate::record::Record;

/// A source of records consumed one at a time.
///
/// `next` returns [`ExecutionError::EndOfStream`] once exhausted and
/// [`ExecutionError::Cancelled`] if `ctx` is cancelled while waiting.
/// Point-lookup streams return [`ExecutionError::NotFound`] when the looked
/// up record does not exist. `close` releases resources and may be called
/// any number of times.
#[async_trait]
pub trait RecordStream: Send {
    async fn next(&mut self, ctx: &Context) -> Result<Record, ExecutionError>;

    async fn close(&mut self) -> Result<(), ExecutionError>;
}

/// Drains `stream` until end of stream. The stream is closed on every exit
/// path, including errors and cancellation.
pub async fn read_all<S>(stream: &mut S, ctx: &Context) -> Result<Vec<Record>, ExecutionError>
where
    S: RecordStream + ?Sized,
{
    let mut records = Vec::new();
    let drained = loop {
        match stream.next(ctx).await {
            Ok(record) => records.push(record),
            Err(ExecutionError::EndOfStream) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let closed = stream.close().await;
    drained?;
    closed?;
    Ok(records)
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// A stream over records already in memory.
#[derive(Debug, Default)]
pub struct InMemoryStream {
    records: VecDeque<Record>,
}

impl InMemoryStream {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RecordStream for InMemoryStream {
    async fn next(&mut self, ctx: &Context) -> Result<Record, ExecutionError> {
        if ctx.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        self.records.pop_front().ok_or(ExecutionError::EndOfStream)
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        self.records.clear();
        Ok(())
    }
}

// ── Channel ─────────────────────────────────────────────────────────────────

/// A stream fed by a producer task through a bounded channel.
///
/// `next` waits for the producer. The stream ends when every sender is
/// dropped. Closing stops the producer's further sends from succeeding.
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::Receiver<Record>,
    closed: bool,
}

impl ChannelStream {
    pub fn new(rx: mpsc::Receiver<Record>) -> Self {
        Self { rx, closed: false }
    }

    /// A stream together with the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Record>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl RecordStream for ChannelStream {
    async fn next(&mut self, ctx: &Context) -> Result<Record, ExecutionError> {
        if self.closed {
            return Err(ExecutionError::EndOfStream);
        }
        let rx = &mut self.rx;
        ctx.run(async move { rx.recv().await.ok_or(ExecutionError::EndOfStream) })
            .await
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        if !self.closed {
            self.rx.close();
            self.closed = true;
        }
        Ok(())
    }
}

// ── Point lookup ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum LookupState {
    Pending(Option<Record>),
    Done,
}

/// The result of a point lookup, exposed as a stream.
///
/// The first `next` yields the record, or [`ExecutionError::NotFound`] if the
/// lookup missed. Every later call returns [`ExecutionError::EndOfStream`].
#[derive(Debug)]
pub struct OneShotLookup {
    state: LookupState,
}

impl OneShotLookup {
    pub fn new(found: Option<Record>) -> Self {
        Self {
            state: LookupState::Pending(found),
        }
    }
}

#[async_trait]
impl RecordStream for OneShotLookup {
    async fn next(&mut self, ctx: &Context) -> Result<Record, ExecutionError> {
        if ctx.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        match std::mem::replace(&mut self.state, LookupState::Done) {
            LookupState::Pending(Some(record)) => Ok(record),
            LookupState::Pending(None) => Err(ExecutionError::NotFound),
            LookupState::Done => Err(ExecutionError::EndOfStream),
        }
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        self.state = LookupState::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::value::{Value, VariableName};

    fn record(i: i64) -> Record {
        Record::builder()
            .build(vec![VariableName::new("i")], vec![Value::Int(i)])
            .unwrap()
    }

    #[tokio::test]
    async fn in_memory_yields_in_order_then_ends() {
        let ctx = Context::background();
        let mut stream = InMemoryStream::new([record(1), record(2)]);
        assert_eq!(stream.next(&ctx).await.unwrap(), record(1));
        assert_eq!(stream.next(&ctx).await.unwrap(), record(2));
        assert!(matches!(
            stream.next(&ctx).await,
            Err(ExecutionError::EndOfStream)
        ));
        assert!(matches!(
            stream.next(&ctx).await,
            Err(ExecutionError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn read_all_collects_and_closes() {
        let ctx = Context::background();
        let (tx, mut stream) = ChannelStream::channel(4);
        tokio::spawn(async move {
            for i in 0..3 {
                tx.send(record(i)).await.unwrap();
            }
        });
        let records = read_all(&mut stream, &ctx).await.unwrap();
        assert_eq!(records, vec![record(0), record(1), record(2)]);
        assert!(stream.closed);
    }

    #[tokio::test]
    async fn blocked_next_aborts_on_cancel() {
        let (ctx, handle) = Context::with_cancel();
        let (_tx, mut stream) = ChannelStream::channel(1);
        let task = tokio::spawn(async move { stream.next(&ctx).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }

    #[tokio::test]
    async fn read_all_closes_on_cancel() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        let (_tx, mut stream) = ChannelStream::channel(1);
        let result = read_all(&mut stream, &ctx).await;
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
        assert!(stream.closed);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_refuses_producers() {
        let ctx = Context::background();
        let (tx, mut stream) = ChannelStream::channel(1);
        stream.close().await.unwrap();
        stream.close().await.unwrap();
        assert!(tx.send(record(1)).await.is_err());
        assert!(matches!(
            stream.next(&ctx).await,
            Err(ExecutionError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn lookup_hit_then_end() {
        let ctx = Context::background();
        let mut hit = OneShotLookup::new(Some(record(7)));
        assert_eq!(hit.next(&ctx).await.unwrap(), record(7));
        assert!(matches!(hit.next(&ctx).await, Err(ExecutionError::EndOfStream)));
    }

    #[tokio::test]
    async fn lookup_miss_is_not_found() {
        let ctx = Context::background();
        let mut miss = OneShotLookup::new(None);
        assert!(matches!(miss.next(&ctx).await, Err(ExecutionError::NotFound)));
        assert!(matches!(miss.next(&ctx).await, Err(ExecutionError::EndOfStream)));
    }

    #[tokio::test]
    async fn streams_work_behind_trait_objects() {
        let ctx = Context::background();
        let mut stream: Box<dyn RecordStream> = Box::new(InMemoryStream::new([record(1)]));
        let records = read_all(stream.as_mut(), &ctx).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
