use std::future::Future;

use serde_json::json;

use super::{decision, start_case, TestResult};
use crate::definition::{APPROVAL_TASK, MANUAL_TASK};
use crate::{ExecutionEngine, VariableMap, USER_TASK};

pub(super) async fn run_history_tests<E, F, Fut>(factory: &F) -> Vec<TestResult>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    vec![
        TestResult::from_result(
            "history",
            "activities_ordered_by_start_time",
            activities_ordered_by_start_time(factory).await,
        ),
        TestResult::from_result(
            "history",
            "user_task_activities_carry_assignee",
            user_task_activities_carry_assignee(factory).await,
        ),
        TestResult::from_result(
            "history",
            "running_task_has_no_end_time",
            running_task_has_no_end_time(factory).await,
        ),
        TestResult::from_result(
            "variables",
            "historic_value_survives_termination",
            historic_value_survives_termination(factory).await,
        ),
        TestResult::from_result(
            "variables",
            "historic_value_is_latest_write",
            historic_value_is_latest_write(factory).await,
        ),
        TestResult::from_result(
            "variables",
            "historic_variables_cover_all_names",
            historic_variables_cover_all_names(factory).await,
        ),
    ]
}

/// Run a case through approval and the manual step to completion.
async fn run_to_completion<E: ExecutionEngine>(engine: &E) -> Result<String, String> {
    let (case_id, task) = start_case(engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, decision("APPROVED", "MANUAL_PENDING"))
        .await
        .map_err(|e| e.to_string())?;
    let manual = engine
        .active_task(&case_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("approved case has no active task")?;
    let mut done = VariableMap::new();
    done.insert("processStatus".into(), json!("COMPLETED"));
    engine
        .complete_task(&manual.id, done)
        .await
        .map_err(|e| e.to_string())?;
    Ok(case_id)
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn activities_ordered_by_start_time<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let case_id = run_to_completion(&engine).await?;
    let history = engine
        .read_historic_activities(&case_id)
        .await
        .map_err(|e| e.to_string())?;
    if history.windows(2).any(|w| w[0].start_time > w[1].start_time) {
        return Err("activities not ordered by start time".to_string());
    }
    let approval = history.iter().position(|a| a.activity_id == APPROVAL_TASK);
    let manual = history.iter().position(|a| a.activity_id == MANUAL_TASK);
    match (approval, manual) {
        (Some(a), Some(m)) if a < m => Ok(()),
        _ => Err(format!(
            "expected approval before manual task, got {:?}",
            history.iter().map(|a| &a.activity_id).collect::<Vec<_>>()
        )),
    }
}

async fn user_task_activities_carry_assignee<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let case_id = run_to_completion(&engine).await?;
    let history = engine
        .read_historic_activities(&case_id)
        .await
        .map_err(|e| e.to_string())?;
    for activity in history.iter().filter(|a| a.activity_type == USER_TASK) {
        let expected = if activity.activity_id == APPROVAL_TASK {
            "approver-1"
        } else {
            "executor-1"
        };
        if activity.assignee.as_deref() != Some(expected) {
            return Err(format!(
                "activity {} assigned to {:?}, expected {expected}",
                activity.activity_id, activity.assignee
            ));
        }
    }
    Ok(())
}

async fn running_task_has_no_end_time<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, _) = start_case(&engine, "approver-1", "executor-1").await?;
    let history = engine
        .read_historic_activities(&case_id)
        .await
        .map_err(|e| e.to_string())?;
    let running = history
        .iter()
        .find(|a| a.activity_id == APPROVAL_TASK)
        .ok_or("approval task missing from history")?;
    if running.end_time.is_some() {
        return Err("active approval task already has an end time".to_string());
    }
    Ok(())
}

async fn historic_value_survives_termination<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let case_id = run_to_completion(&engine).await?;
    let status = engine
        .read_historic_variable(&case_id, "processStatus")
        .await
        .map_err(|e| e.to_string())?;
    if status != Some(json!("COMPLETED")) {
        return Err(format!("historic processStatus is {status:?}"));
    }
    Ok(())
}

async fn historic_value_is_latest_write<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let case_id = run_to_completion(&engine).await?;
    let result = engine
        .read_historic_variable(&case_id, "approvalResult")
        .await
        .map_err(|e| e.to_string())?;
    if result != Some(json!("APPROVED")) {
        return Err(format!(
            "approvalResult was written null then APPROVED, read {result:?}"
        ));
    }
    Ok(())
}

async fn historic_variables_cover_all_names<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let case_id = run_to_completion(&engine).await?;
    let records = engine
        .read_historic_variables(&case_id)
        .await
        .map_err(|e| e.to_string())?;
    for name in ["initiator", "approverId", "executorId", "processStatus", "payload"] {
        if !records.iter().any(|r| r.name == name) {
            return Err(format!("historic variables missing '{name}'"));
        }
    }
    if records.iter().any(|r| r.case_id != case_id) {
        return Err("historic variables leaked from another case".to_string());
    }
    Ok(())
}
