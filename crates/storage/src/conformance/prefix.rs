//! Prefix scoping conformance tests.
//!
//! Structures built on the store live in disjoint prefixes of one key space
//! and rely on ordered prefix scans, so both are checked here through the
//! generic [`PrefixedTransaction`](crate::PrefixedTransaction) views.

use std::future::Future;

use super::TestResult;
use crate::{Namespace, StateStore, StateTransaction};

pub(super) async fn run_prefix_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "prefix",
            "namespaces_are_disjoint",
            namespaces_are_disjoint(factory).await,
        ),
        TestResult::from_result(
            "prefix",
            "first_with_prefix_returns_smallest_key",
            first_with_prefix_returns_smallest_key(factory).await,
        ),
        TestResult::from_result(
            "prefix",
            "first_with_prefix_empty_region",
            first_with_prefix_empty_region(factory).await,
        ),
        TestResult::from_result(
            "prefix",
            "scoped_scan_strips_prefix",
            scoped_scan_strips_prefix(factory).await,
        ),
        TestResult::from_result(
            "prefix",
            "nested_views_concatenate",
            nested_views_concatenate(factory).await,
        ),
        TestResult::from_result(
            "prefix",
            "scan_does_not_leak_into_sibling_prefix",
            scan_does_not_leak_into_sibling_prefix(factory).await,
        ),
    ]
}

// ── 1. namespaces_are_disjoint ──────────────────────────────────────────────

async fn namespaces_are_disjoint<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let left = Namespace::new("$left$");
    let right = Namespace::new("$right$");

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.with_namespace(&left)
        .set(b"k", b"L")
        .await
        .map_err(|e| e.to_string())?;
    tx.with_namespace(&right)
        .set(b"k", b"R")
        .await
        .map_err(|e| e.to_string())?;
    s.commit(tx).await.map_err(|e| e.to_string())?;

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let l = tx
        .with_namespace(&left)
        .get(b"k")
        .await
        .map_err(|e| e.to_string())?;
    let r = tx
        .with_namespace(&right)
        .get(b"k")
        .await
        .map_err(|e| e.to_string())?;
    let raw = tx.get(b"k").await.map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;

    if l.as_deref() != Some(b"L".as_slice()) || r.as_deref() != Some(b"R".as_slice()) {
        return Err(format!("namespaced values mixed up: left={l:?} right={r:?}"));
    }
    if raw.is_some() {
        return Err(format!("unprefixed key must be absent, got {raw:?}"));
    }
    Ok(())
}

// ── 2. first_with_prefix_returns_smallest_key ───────────────────────────────

async fn first_with_prefix_returns_smallest_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    for key in [
        b"idx/\x03".as_slice(),
        b"idx/\x01\xff".as_slice(),
        b"idx/\x02".as_slice(),
    ] {
        tx.set(key, b"v").await.map_err(|e| e.to_string())?;
    }
    s.commit(tx).await.map_err(|e| e.to_string())?;

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let first = tx
        .first_with_prefix(b"idx/")
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;

    match first {
        Some((key, _)) if key == b"idx/\x01\xff" => Ok(()),
        other => Err(format!("expected idx/\\x01\\xff first, got {other:?}")),
    }
}

// ── 3. first_with_prefix_empty_region ───────────────────────────────────────

async fn first_with_prefix_empty_region<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let first = tx
        .first_with_prefix(b"nothing/")
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    match first {
        None => Ok(()),
        Some(entry) => Err(format!("expected no entry, got {entry:?}")),
    }
}

// ── 4. scoped_scan_strips_prefix ────────────────────────────────────────────

async fn scoped_scan_strips_prefix<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ns = Namespace::new("$scoped$");
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let mut view = tx.with_namespace(&ns);
    view.set(b"b", b"2").await.map_err(|e| e.to_string())?;
    view.set(b"a", b"1").await.map_err(|e| e.to_string())?;
    let first = view
        .first_with_prefix(b"")
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;

    match first {
        Some((key, value)) if key == b"a" && value == b"1" => Ok(()),
        other => Err(format!("expected (a, 1), got {other:?}")),
    }
}

// ── 5. nested_views_concatenate ─────────────────────────────────────────────

async fn nested_views_concatenate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.with_prefix(b"outer/")
        .with_prefix(b"inner/")
        .set(b"k", b"v")
        .await
        .map_err(|e| e.to_string())?;
    let raw = tx
        .get(b"outer/inner/k")
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;

    if raw.as_deref() != Some(b"v".as_slice()) {
        return Err(format!("expected nested key outer/inner/k = v, got {raw:?}"));
    }
    Ok(())
}

// ── 6. scan_does_not_leak_into_sibling_prefix ───────────────────────────────

async fn scan_does_not_leak_into_sibling_prefix<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.set(b"ab/1", b"x").await.map_err(|e| e.to_string())?;
    let first = tx
        .first_with_prefix(b"aa/")
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    match first {
        None => Ok(()),
        Some(entry) => Err(format!("scan of aa/ leaked {entry:?}")),
    }
}
