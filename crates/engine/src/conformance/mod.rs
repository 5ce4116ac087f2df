//! Conformance test suite for `ExecutionEngine` implementations.
//!
//! A backend-agnostic suite that any engine offering the approval process
//! ([`crate::APPROVAL_PROCESS_KEY`]) can run to verify it honours the
//! contract the orchestration core relies on:
//!
//! - **Creation**: a new case has exactly one task, for the approver
//! - **Task queries**: lookup by id, by case, by assignee and step kind
//! - **Completion**: variable deltas land, the case advances or ends
//! - **History**: activities ordered by start, variables survive termination
//! - **Concurrency**: racing completions of one task, exactly one wins
//!
//! # Usage
//!
//! ```ignore
//! use approvals_engine::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn my_engine_conformance() {
//!     let report = run_conformance_suite(|| async { MyEngine::connect().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod complete;
mod concurrent;
mod create;
mod history;
mod tasks;

use std::fmt;
use std::future::Future;

use serde_json::json;

use crate::definition::APPROVAL_PROCESS_KEY;
use crate::record::{TaskRecord, VariableMap};
use crate::ExecutionEngine;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "create", "complete", "history").
    pub category: String,
    /// Test name (e.g. "new_case_has_one_task").
    pub name: String,
    pub passed: bool,
    /// Failure message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        TestResult {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
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
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against an engine.
///
/// `factory` is called once per test and must return a fresh engine with
/// the approval process available, so tests never see each other's cases.
pub async fn run_conformance_suite<E, F, Fut>(factory: F) -> ConformanceReport
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let mut results = Vec::new();

    results.extend(create::run_create_tests(&factory).await);
    results.extend(tasks::run_task_tests(&factory).await);
    results.extend(complete::run_complete_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
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

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Initial variables of an approval case between `approver` and `executor`.
fn case_variables(approver: &str, executor: &str) -> VariableMap {
    let mut vars = VariableMap::new();
    vars.insert("initiator".into(), json!("conformance"));
    vars.insert("approverId".into(), json!(approver));
    vars.insert("executorId".into(), json!(executor));
    vars.insert("processStatus".into(), json!("APPROVAL_PENDING"));
    vars.insert("approvalResult".into(), serde_json::Value::Null);
    vars.insert("payload".into(), json!({"amount": 100}));
    vars
}

/// Variable delta of an approval decision.
fn decision(result: &str, status: &str) -> VariableMap {
    let mut vars = VariableMap::new();
    vars.insert("approvalResult".into(), json!(result));
    vars.insert("processStatus".into(), json!(status));
    vars
}

/// Start a case and return it together with its first task.
async fn start_case<E: ExecutionEngine>(
    engine: &E,
    approver: &str,
    executor: &str,
) -> Result<(String, TaskRecord), String> {
    let case_id = engine
        .create_case(APPROVAL_PROCESS_KEY, case_variables(approver, executor))
        .await
        .map_err(|e| format!("create_case: {e}"))?;
    let task = engine
        .active_task(&case_id)
        .await
        .map_err(|e| format!("active_task: {e}"))?
        .ok_or_else(|| format!("case {case_id} has no active task after creation"))?;
    Ok((case_id, task))
}
