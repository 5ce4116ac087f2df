use std::future::Future;
use std::sync::Arc;

use super::{decision, start_case, TestResult};
use crate::{EngineError, ExecutionEngine};

/// Number of concurrent completions to race in each test.
const N: usize = 8;

pub(super) async fn run_concurrent_tests<E, F, Fut>(factory: &F) -> Vec<TestResult>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "racing_completions_exactly_one_wins",
            racing_completions_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "independent_cases_all_advance",
            independent_cases_all_advance(factory).await,
        ),
    ]
}

// ── Racing completion: exactly one wins ─────────────────────────────────────

/// N tasks race to complete the same approval task with conflicting
/// decisions. Exactly one must succeed and the case must end up with at
/// most one active task.
async fn racing_completions_exactly_one_wins<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = Arc::new(factory().await);
    let (case_id, task) = start_case(engine.as_ref(), "approver-1", "executor-1").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let e = engine.clone();
        let task_id = task.id.clone();
        handles.push(tokio::spawn(async move {
            let delta = if i % 2 == 0 {
                decision("APPROVED", "MANUAL_PENDING")
            } else {
                decision("REJECTED", "REJECTED")
            };
            e.complete_task(&task_id, delta).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.map_err(|e| format!("join: {e}"))? {
            Ok(()) => wins += 1,
            Err(EngineError::TaskNotFound { .. })
            | Err(EngineError::ConcurrentModification { .. }) => {}
            Err(other) => return Err(format!("unexpected race error: {other}")),
        }
    }
    if wins != 1 {
        return Err(format!("expected exactly one winning completion, got {wins}"));
    }

    let active = engine
        .find_tasks(&crate::TaskQuery::default().for_case(case_id))
        .await
        .map_err(|e| e.to_string())?;
    if active.len() > 1 {
        return Err(format!("case has {} active tasks after race", active.len()));
    }
    Ok(())
}

/// Completions of different cases must not interfere.
async fn independent_cases_all_advance<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = Arc::new(factory().await);
    let mut started = Vec::new();
    for i in 0..N {
        started.push(start_case(engine.as_ref(), &format!("approver-{i}"), "executor").await?);
    }

    let mut handles = Vec::new();
    for (_, task) in &started {
        let e = engine.clone();
        let task_id = task.id.clone();
        handles.push(tokio::spawn(async move {
            e.complete_task(&task_id, decision("APPROVED", "MANUAL_PENDING"))
                .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e| format!("complete: {e}"))?;
    }

    for (case_id, _) in &started {
        let status = engine
            .read_variable(case_id, "processStatus")
            .await
            .map_err(|e| e.to_string())?;
        if status != Some(serde_json::json!("MANUAL_PENDING")) {
            return Err(format!("case {case_id} ended in {status:?}"));
        }
    }
    Ok(())
}
