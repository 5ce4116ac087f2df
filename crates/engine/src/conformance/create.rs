use std::future::Future;

use super::{case_variables, start_case, TestResult};
use crate::definition::{APPROVAL_PROCESS_KEY, APPROVAL_TASK};
use crate::{EngineError, ExecutionEngine, TaskQuery};

pub(super) async fn run_create_tests<E, F, Fut>(factory: &F) -> Vec<TestResult>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    vec![
        TestResult::from_result(
            "create",
            "new_case_has_one_approval_task",
            new_case_has_one_approval_task(factory).await,
        ),
        TestResult::from_result(
            "create",
            "first_task_assigned_to_approver",
            first_task_assigned_to_approver(factory).await,
        ),
        TestResult::from_result(
            "create",
            "initial_variables_readable_live",
            initial_variables_readable_live(factory).await,
        ),
        TestResult::from_result(
            "create",
            "case_ids_are_unique",
            case_ids_are_unique(factory).await,
        ),
        TestResult::from_result(
            "create",
            "unknown_definition_rejected",
            unknown_definition_rejected(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn new_case_has_one_approval_task<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    if task.definition_key != APPROVAL_TASK {
        return Err(format!(
            "expected first task '{APPROVAL_TASK}', got '{}'",
            task.definition_key
        ));
    }
    let all = engine
        .find_tasks(&TaskQuery::default().for_case(case_id.clone()))
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("expected 1 active task, got {}", all.len()));
    }
    if !engine.is_active(&case_id).await.map_err(|e| e.to_string())? {
        return Err("new case is not active".to_string());
    }
    Ok(())
}

async fn first_task_assigned_to_approver<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (_, task) = start_case(&engine, "approver-1", "executor-1").await?;
    match task.assignee.as_deref() {
        Some("approver-1") => Ok(()),
        other => Err(format!("expected assignee approver-1, got {other:?}")),
    }
}

async fn initial_variables_readable_live<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, _) = start_case(&engine, "approver-1", "executor-1").await?;
    let vars = engine
        .read_variables(&case_id)
        .await
        .map_err(|e| e.to_string())?;
    let expected = case_variables("approver-1", "executor-1");
    for (name, value) in &expected {
        if vars.get(name) != Some(value) {
            return Err(format!(
                "variable '{name}': expected {value}, got {:?}",
                vars.get(name)
            ));
        }
    }
    let status = engine
        .read_variable(&case_id, "processStatus")
        .await
        .map_err(|e| e.to_string())?;
    if status != Some(serde_json::json!("APPROVAL_PENDING")) {
        return Err(format!("processStatus read back as {status:?}"));
    }
    Ok(())
}

async fn case_ids_are_unique<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (a, ta) = start_case(&engine, "approver-1", "executor-1").await?;
    let (b, tb) = start_case(&engine, "approver-1", "executor-1").await?;
    if a == b || ta.id == tb.id {
        return Err(format!("duplicate ids: cases {a}/{b}, tasks {}/{}", ta.id, tb.id));
    }
    Ok(())
}

async fn unknown_definition_rejected<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    match engine
        .create_case("noSuchProcess", case_variables("a", "b"))
        .await
    {
        Err(EngineError::DefinitionNotFound { key }) if key == "noSuchProcess" => {
            // The real definition must still work afterwards.
            engine
                .create_case(APPROVAL_PROCESS_KEY, case_variables("a", "b"))
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        Err(other) => Err(format!("expected DefinitionNotFound, got {other}")),
        Ok(id) => Err(format!("unknown definition created case {id}")),
    }
}
