use std::future::Future;
use std::sync::Arc;

use super::{read_committed, seed, TestResult};
use crate::{StateError, StateStore, StateTransaction};

/// Number of concurrent transactions in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "read_modify_write_exactly_one_wins",
            read_modify_write_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "disjoint_writes_all_commit",
            disjoint_writes_all_commit(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "scan_conflicts_with_insert_under_prefix",
            scan_conflicts_with_insert_under_prefix(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "counter_matches_successful_commits",
            counter_matches_successful_commits(factory).await,
        ),
    ]
}

// ── Read-modify-write: exactly one wins ─────────────────────────────────────

/// N transactions all begin before any commits, each read the same key and
/// write it back. Only the first commit may succeed; the rest must observe a
/// conflict, otherwise an update would be lost.
async fn read_modify_write_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), &[("counter", "0")]).await?;

    let mut txs = Vec::with_capacity(N);
    for i in 0..N {
        let mut tx = storage.begin().await.map_err(|e| format!("begin: {e}"))?;
        tx.get(b"counter").await.map_err(|e| format!("get: {e}"))?;
        tx.set(b"counter", format!("{}", i + 1).as_bytes())
            .await
            .map_err(|e| format!("set: {e}"))?;
        txs.push(tx);
    }

    let mut handles = Vec::new();
    for tx in txs {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            match s.commit(tx).await {
                Ok(()) => Ok(true),
                Err(StateError::Conflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StateError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Disjoint writes: all commit ─────────────────────────────────────────────

async fn disjoint_writes_all_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = s.begin().await?;
            let key = format!("partition-{i}");
            tx.with_prefix(key.as_bytes()).set(b"", b"x").await?;
            s.commit(tx).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StateError| format!("disjoint commit failed: {e}"))?;
    }

    for i in 0..N {
        let key = format!("partition-{i}");
        if read_committed(storage.as_ref(), &key).await?.is_none() {
            return Err(format!("{key} missing after commit"));
        }
    }
    Ok(())
}

// ── Prefix scan vs concurrent insert ────────────────────────────────────────

/// A transaction that scanned a prefix must not commit if another
/// transaction inserted under that prefix in the meantime: the scan result
/// it acted on is stale.
async fn scan_conflicts_with_insert_under_prefix<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &[("idx/5", "")]).await?;

    let mut scanner = s.begin().await.map_err(|e| e.to_string())?;
    scanner
        .first_with_prefix(b"idx/")
        .await
        .map_err(|e| e.to_string())?;
    scanner
        .set(b"fired", b"idx/5")
        .await
        .map_err(|e| e.to_string())?;

    seed(&s, &[("idx/1", "")]).await?;

    match s.commit(scanner).await {
        Err(StateError::Conflict { .. }) => Ok(()),
        other => Err(format!("expected Conflict for stale scan, got {other:?}")),
    }
}

// ── Counter consistency ─────────────────────────────────────────────────────

/// N tasks race to increment a counter, retrying nothing. Whatever the
/// interleaving, the final value must equal the number of commits that
/// succeeded.
async fn counter_matches_successful_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), &[("counter", "0")]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = s.begin().await?;
            let current: u64 = match tx.get(b"counter").await? {
                Some(bytes) => String::from_utf8_lossy(&bytes).parse().unwrap_or(0),
                None => 0,
            };
            tx.set(b"counter", (current + 1).to_string().as_bytes())
                .await?;
            match s.commit(tx).await {
                Ok(()) => Ok(true),
                Err(StateError::Conflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut committed = 0u64;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StateError| format!("storage error: {e}"))?;
        if won {
            committed += 1;
        }
    }

    let final_value = read_committed(storage.as_ref(), "counter")
        .await?
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();
    if final_value != committed.to_string() {
        return Err(format!(
            "counter is {final_value} but {committed} increments committed"
        ));
    }
    Ok(())
}
