//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a transaction,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{expect_value, read_committed, seed, TestResult};
use crate::{StateStore, StateTransaction};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "begin_and_abort_succeed",
            begin_and_abort_succeed(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "own_writes_visible_in_transaction",
            own_writes_visible_in_transaction(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_write_invisible",
            uncommitted_write_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "committed_write_visible",
            committed_write_visible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "aborted_write_discarded",
            aborted_write_discarded(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_transaction_discarded",
            dropped_transaction_discarded(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "committed_delete_visible",
            committed_delete_visible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "open_transaction_keeps_its_snapshot",
            open_transaction_keeps_its_snapshot(factory).await,
        ),
    ]
}

// ── 1. begin_and_abort_succeed ──────────────────────────────────────────────

async fn begin_and_abort_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tx = s.begin().await.map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())
}

// ── 2. own_writes_visible_in_transaction ────────────────────────────────────

async fn own_writes_visible_in_transaction<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.set(b"k", b"v").await.map_err(|e| e.to_string())?;
    let got = tx.get(b"k").await.map_err(|e| e.to_string())?;
    expect_value("k", got, Some("v"))?;

    tx.delete(b"k").await.map_err(|e| e.to_string())?;
    let got = tx.get(b"k").await.map_err(|e| e.to_string())?;
    expect_value("k", got, None)?;

    s.abort(tx).await.map_err(|e| e.to_string())
}

// ── 3. uncommitted_write_invisible ──────────────────────────────────────────

async fn uncommitted_write_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.set(b"k", b"v").await.map_err(|e| e.to_string())?;
    // Left open on purpose.

    expect_value("k", read_committed(&s, "k").await?, None)?;

    s.abort(tx).await.map_err(|e| e.to_string())
}

// ── 4. committed_write_visible ──────────────────────────────────────────────

async fn committed_write_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[("k", "v")]).await?;
    expect_value("k", read_committed(&s, "k").await?, Some("v"))
}

// ── 5. aborted_write_discarded ──────────────────────────────────────────────

async fn aborted_write_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[("k", "v1")]).await?;

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.set(b"k", b"v2").await.map_err(|e| e.to_string())?;
    tx.set(b"other", b"x").await.map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;

    expect_value("k", read_committed(&s, "k").await?, Some("v1"))?;
    expect_value("other", read_committed(&s, "other").await?, None)
}

// ── 6. dropped_transaction_discarded ────────────────────────────────────────

async fn dropped_transaction_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut tx = s.begin().await.map_err(|e| e.to_string())?;
        tx.set(b"k", b"v").await.map_err(|e| e.to_string())?;
    }
    expect_value("k", read_committed(&s, "k").await?, None)
}

// ── 7. committed_delete_visible ─────────────────────────────────────────────

async fn committed_delete_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[("k", "v")]).await?;

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.delete(b"k").await.map_err(|e| e.to_string())?;
    tx.delete(b"never-existed")
        .await
        .map_err(|e| format!("deleting an absent key must succeed: {e}"))?;
    s.commit(tx).await.map_err(|e| e.to_string())?;

    expect_value("k", read_committed(&s, "k").await?, None)
}

// ── 8. open_transaction_keeps_its_snapshot ──────────────────────────────────

async fn open_transaction_keeps_its_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[("k", "v1")]).await?;

    let mut reader = s.begin().await.map_err(|e| e.to_string())?;
    seed(&s, &[("k", "v2")]).await?;

    let got = reader.get(b"k").await.map_err(|e| e.to_string())?;
    s.abort(reader).await.map_err(|e| e.to_string())?;
    expect_value("k", got, Some("v1"))
}
