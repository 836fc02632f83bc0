//! Conformance test suite for `StateStore` implementations.
//!
//! Backend-agnostic checks that any `StateStore` can run to verify the
//! guarantees the trigger subsystem relies on. The suite covers:
//!
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes
//!   visible, aborted and dropped transactions discarded
//! - **Prefix scoping**: disjoint namespaces, ordered prefix scans, nested views
//! - **Typed values**: `ValueState` round trips, not-found and codec errors
//! - **Concurrency**: conflicting commits detected, disjoint commits accepted
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use tidal_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn rocks_conformance() {
//!     let report = run_conformance_suite(|| async { open_temp_rocks_store().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod prefix;
mod snapshot;
mod value;

use std::fmt;
use std::future::Future;

use crate::{StateStore, StateTransaction};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "prefix").
    pub category: String,
    /// Test name (e.g. "uncommitted_write_invisible").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a state store.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: StateStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(prefix::run_prefix_tests(&factory).await);
    results.extend(value::run_value_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Writes `entries` in one transaction and commits it.
async fn seed<S: StateStore>(store: &S, entries: &[(&str, &str)]) -> Result<(), String> {
    let mut tx = store.begin().await.map_err(|e| format!("begin: {e}"))?;
    for (key, value) in entries {
        tx.set(key.as_bytes(), value.as_bytes())
            .await
            .map_err(|e| format!("set {key}: {e}"))?;
    }
    store.commit(tx).await.map_err(|e| format!("commit: {e}"))
}

/// Reads `key` in a fresh transaction that is aborted afterwards.
async fn read_committed<S: StateStore>(store: &S, key: &str) -> Result<Option<Vec<u8>>, String> {
    let mut tx = store.begin().await.map_err(|e| format!("begin: {e}"))?;
    let value = tx
        .get(key.as_bytes())
        .await
        .map_err(|e| format!("get {key}: {e}"))?;
    store.abort(tx).await.map_err(|e| format!("abort: {e}"))?;
    Ok(value)
}

fn expect_value(key: &str, got: Option<Vec<u8>>, want: Option<&str>) -> Result<(), String> {
    if got.as_deref() == want.map(str::as_bytes) {
        Ok(())
    } else {
        let got = got.map(|g| String::from_utf8_lossy(&g).into_owned());
        Err(format!("key {key}: expected {want:?}, got {got:?}"))
    }
}
