//! Typed scalar conformance tests.
//!
//! Verifies that `ValueState` round trips through the store, reports absence
//! with `StateError::NotFound`, and surfaces undecodable bytes as
//! `StateError::Codec` instead of a default.

use std::future::Future;

use super::TestResult;
use crate::{StateError, StateStore, StateTransaction, ValueState};

pub(super) async fn run_value_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "value",
            "unset_value_is_not_found",
            unset_value_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "value",
            "set_value_survives_commit",
            set_value_survives_commit(factory).await,
        ),
        TestResult::from_result(
            "value",
            "get_or_defaults_when_absent",
            get_or_defaults_when_absent(factory).await,
        ),
        TestResult::from_result(
            "value",
            "cleared_value_is_not_found",
            cleared_value_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "value",
            "corrupt_bytes_are_codec_error",
            corrupt_bytes_are_codec_error(factory).await,
        ),
    ]
}

// ── 1. unset_value_is_not_found ─────────────────────────────────────────────

async fn unset_value_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let result = ValueState::<_, i64>::new(tx.with_prefix(b"$v$")).get().await;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    match result {
        Err(StateError::NotFound) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}

// ── 2. set_value_survives_commit ────────────────────────────────────────────

async fn set_value_survives_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    ValueState::<_, Vec<String>>::new(tx.with_prefix(b"$v$"))
        .set(&vec!["a".to_string(), "b".to_string()])
        .await
        .map_err(|e| e.to_string())?;
    s.commit(tx).await.map_err(|e| e.to_string())?;

    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let got = ValueState::<_, Vec<String>>::new(tx.with_prefix(b"$v$"))
        .get()
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    if got != ["a", "b"] {
        return Err(format!("expected [a, b], got {got:?}"));
    }
    Ok(())
}

// ── 3. get_or_defaults_when_absent ──────────────────────────────────────────

async fn get_or_defaults_when_absent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let got = ValueState::<_, bool>::new(tx.with_prefix(b"$flag$"))
        .get_or(false)
        .await
        .map_err(|e| e.to_string())?;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    if got {
        return Err("expected default false".to_string());
    }
    Ok(())
}

// ── 4. cleared_value_is_not_found ───────────────────────────────────────────

async fn cleared_value_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    let mut state = ValueState::<_, u32>::new(tx.with_prefix(b"$v$"));
    state.set(&9).await.map_err(|e| e.to_string())?;
    state.clear().await.map_err(|e| e.to_string())?;
    let result = state.get().await;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("expected NotFound after clear, got {other:?}")),
    }
}

// ── 5. corrupt_bytes_are_codec_error ────────────────────────────────────────

async fn corrupt_bytes_are_codec_error<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut tx = s.begin().await.map_err(|e| e.to_string())?;
    tx.set(b"$v$", b"\xff not json")
        .await
        .map_err(|e| e.to_string())?;
    let result = ValueState::<_, u32>::new(tx.with_prefix(b"$v$")).get().await;
    s.abort(tx).await.map_err(|e| e.to_string())?;
    match result {
        Err(StateError::Codec(_)) => Ok(()),
        other => Err(format!("expected Codec error, got {other:?}")),
    }
}
