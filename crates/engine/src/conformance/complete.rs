use std::future::Future;

use serde_json::json;

use super::{decision, start_case, TestResult};
use crate::definition::MANUAL_TASK;
use crate::{EngineError, ExecutionEngine, TaskQuery, VariableMap};

pub(super) async fn run_complete_tests<E, F, Fut>(factory: &F) -> Vec<TestResult>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    vec![
        TestResult::from_result(
            "complete",
            "approval_creates_manual_task_for_executor",
            approval_creates_manual_task_for_executor(factory).await,
        ),
        TestResult::from_result(
            "complete",
            "rejection_terminates_case",
            rejection_terminates_case(factory).await,
        ),
        TestResult::from_result(
            "complete",
            "manual_completion_terminates_case",
            manual_completion_terminates_case(factory).await,
        ),
        TestResult::from_result(
            "complete",
            "delta_written_before_advance",
            delta_written_before_advance(factory).await,
        ),
        TestResult::from_result(
            "complete",
            "completed_task_cannot_complete_again",
            completed_task_cannot_complete_again(factory).await,
        ),
        TestResult::from_result(
            "complete",
            "unknown_task_completion_fails",
            unknown_task_completion_fails(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn approval_creates_manual_task_for_executor<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, decision("APPROVED", "MANUAL_PENDING"))
        .await
        .map_err(|e| e.to_string())?;

    let next = engine
        .active_task(&case_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("approved case has no active task")?;
    if next.definition_key != MANUAL_TASK {
        return Err(format!("expected manual task, got {}", next.definition_key));
    }
    if next.assignee.as_deref() != Some("executor-1") {
        return Err(format!("manual task assigned to {:?}", next.assignee));
    }
    if next.id == task.id {
        return Err("manual task reused the approval task id".to_string());
    }
    Ok(())
}

async fn rejection_terminates_case<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, decision("REJECTED", "REJECTED"))
        .await
        .map_err(|e| e.to_string())?;

    if engine
        .active_task(&case_id)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("rejected case still has an active task".to_string());
    }
    if engine.is_active(&case_id).await.map_err(|e| e.to_string())? {
        return Err("rejected case is still active".to_string());
    }
    let executor_tasks = engine
        .find_tasks(&TaskQuery::assigned_to("executor-1"))
        .await
        .map_err(|e| e.to_string())?;
    if !executor_tasks.is_empty() {
        return Err("rejected case produced a task for the executor".to_string());
    }
    Ok(())
}

async fn manual_completion_terminates_case<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, decision("APPROVED", "MANUAL_PENDING"))
        .await
        .map_err(|e| e.to_string())?;
    let manual = engine
        .active_task(&case_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("approved case has no active task")?;

    let mut delta = VariableMap::new();
    delta.insert("processStatus".into(), json!("COMPLETED"));
    engine
        .complete_task(&manual.id, delta)
        .await
        .map_err(|e| e.to_string())?;

    if engine.is_active(&case_id).await.map_err(|e| e.to_string())? {
        return Err("completed case is still active".to_string());
    }
    match engine.read_variables(&case_id).await {
        Err(e) if e.is_live_miss() => Ok(()),
        Err(e) => Err(format!("live read of ended case failed oddly: {e}")),
        Ok(vars) => Err(format!("ended case still exposes {} live variables", vars.len())),
    }
}

async fn delta_written_before_advance<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    let mut delta = decision("APPROVED", "MANUAL_PENDING");
    delta.insert("lastOperator".into(), json!("approver-1"));
    engine
        .complete_task(&task.id, delta)
        .await
        .map_err(|e| e.to_string())?;

    let status = engine
        .read_variable(&case_id, "processStatus")
        .await
        .map_err(|e| e.to_string())?;
    let operator = engine
        .read_variable(&case_id, "lastOperator")
        .await
        .map_err(|e| e.to_string())?;
    if status != Some(json!("MANUAL_PENDING")) || operator != Some(json!("approver-1")) {
        return Err(format!("delta not visible: status={status:?} operator={operator:?}"));
    }
    Ok(())
}

async fn completed_task_cannot_complete_again<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (_, task) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, decision("REJECTED", "REJECTED"))
        .await
        .map_err(|e| e.to_string())?;
    match engine
        .complete_task(&task.id, decision("APPROVED", "MANUAL_PENDING"))
        .await
    {
        Err(EngineError::TaskNotFound { .. }) | Err(EngineError::ConcurrentModification { .. }) => {
            Ok(())
        }
        Err(other) => Err(format!("unexpected error on re-completion: {other}")),
        Ok(()) => Err("task completed twice".to_string()),
    }
}

async fn unknown_task_completion_fails<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    match engine.complete_task("no-such-task", VariableMap::new()).await {
        Err(EngineError::TaskNotFound { task_id }) if task_id == "no-such-task" => Ok(()),
        Err(other) => Err(format!("expected TaskNotFound, got {other}")),
        Ok(()) => Err("completing an unknown task succeeded".to_string()),
    }
}
