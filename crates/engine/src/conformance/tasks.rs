use std::future::Future;

use super::{start_case, TestResult};
use crate::definition::{APPROVAL_TASK, MANUAL_TASK};
use crate::{EngineError, ExecutionEngine, TaskQuery};

pub(super) async fn run_task_tests<E, F, Fut>(factory: &F) -> Vec<TestResult>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    vec![
        TestResult::from_result(
            "tasks",
            "task_lookup_by_id",
            task_lookup_by_id(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "unknown_task_id_is_none",
            unknown_task_id_is_none(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "find_by_assignee_only_returns_theirs",
            find_by_assignee_only_returns_theirs(factory).await,
        ),
        TestResult::from_result(
            "tasks",
            "find_by_definition_key_narrows",
            find_by_definition_key_narrows(factory).await,
        ),
        TestResult::from_result(
            "comments",
            "comments_kept_in_order",
            comments_kept_in_order(factory).await,
        ),
        TestResult::from_result(
            "comments",
            "comments_scoped_to_case",
            comments_scoped_to_case(factory).await,
        ),
        TestResult::from_result(
            "comments",
            "comment_on_ended_case_accepted",
            comment_on_ended_case_accepted(factory).await,
        ),
        TestResult::from_result(
            "comments",
            "comment_on_unknown_case_rejected",
            comment_on_unknown_case_rejected(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn task_lookup_by_id<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    let found = engine
        .task(&task.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("task {} not found by id", task.id))?;
    if found.case_id != case_id || found.id != task.id {
        return Err(format!("lookup returned the wrong task: {found:?}"));
    }
    Ok(())
}

async fn unknown_task_id_is_none<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    start_case(&engine, "approver-1", "executor-1").await?;
    match engine.task("no-such-task").await {
        Ok(None) => Ok(()),
        Ok(Some(t)) => Err(format!("unknown id resolved to {}", t.id)),
        Err(e) => Err(format!("unknown id should be Ok(None), got error {e}")),
    }
}

async fn find_by_assignee_only_returns_theirs<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    start_case(&engine, "approver-1", "executor-1").await?;
    start_case(&engine, "approver-2", "executor-2").await?;
    start_case(&engine, "approver-1", "executor-2").await?;

    let tasks = engine
        .find_tasks(&TaskQuery::assigned_to("approver-1"))
        .await
        .map_err(|e| e.to_string())?;
    if tasks.len() != 2 {
        return Err(format!("expected 2 tasks for approver-1, got {}", tasks.len()));
    }
    if let Some(t) = tasks
        .iter()
        .find(|t| t.assignee.as_deref() != Some("approver-1"))
    {
        return Err(format!("task {} assigned to {:?} leaked", t.id, t.assignee));
    }
    Ok(())
}

async fn find_by_definition_key_narrows<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    // The same user approves one case and executes another.
    let (_, first) = start_case(&engine, "dual", "dual").await?;
    engine
        .complete_task(&first.id, super::decision("APPROVED", "MANUAL_PENDING"))
        .await
        .map_err(|e| e.to_string())?;
    start_case(&engine, "dual", "someone-else").await?;

    let approvals = engine
        .find_tasks(&TaskQuery::assigned_to("dual").with_definition_key(APPROVAL_TASK))
        .await
        .map_err(|e| e.to_string())?;
    let manuals = engine
        .find_tasks(&TaskQuery::assigned_to("dual").with_definition_key(MANUAL_TASK))
        .await
        .map_err(|e| e.to_string())?;
    if approvals.len() != 1 || approvals[0].definition_key != APPROVAL_TASK {
        return Err(format!("approval filter returned {approvals:?}"));
    }
    if manuals.len() != 1 || manuals[0].definition_key != MANUAL_TASK {
        return Err(format!("manual filter returned {manuals:?}"));
    }
    Ok(())
}

async fn comments_kept_in_order<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    for text in ["first", "second"] {
        engine
            .add_comment(&case_id, &task.id, "approver-1", text)
            .await
            .map_err(|e| e.to_string())?;
    }
    let comments = engine.comments(&case_id).await.map_err(|e| e.to_string())?;
    let texts: Vec<&str> = comments.iter().map(|c| c.message.as_str()).collect();
    if texts != ["first", "second"] {
        return Err(format!("comments out of order: {texts:?}"));
    }
    if comments.iter().any(|c| c.author != "approver-1" || c.task_id != task.id) {
        return Err("comment author or task id not preserved".to_string());
    }
    Ok(())
}

async fn comments_scoped_to_case<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (a, ta) = start_case(&engine, "approver-1", "executor-1").await?;
    let (b, _) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .add_comment(&a, &ta.id, "approver-1", "only on a")
        .await
        .map_err(|e| e.to_string())?;
    let on_b = engine.comments(&b).await.map_err(|e| e.to_string())?;
    if !on_b.is_empty() {
        return Err(format!("case {b} sees {} foreign comments", on_b.len()));
    }
    Ok(())
}

async fn comment_on_ended_case_accepted<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    let (case_id, task) = start_case(&engine, "approver-1", "executor-1").await?;
    engine
        .complete_task(&task.id, super::decision("REJECTED", "REJECTED"))
        .await
        .map_err(|e| e.to_string())?;
    engine
        .add_comment(&case_id, &task.id, "approver-1", "Insufficient data")
        .await
        .map_err(|e| format!("comment after end: {e}"))?;
    let comments = engine.comments(&case_id).await.map_err(|e| e.to_string())?;
    if comments.len() != 1 {
        return Err(format!("expected 1 comment, found {}", comments.len()));
    }
    Ok(())
}

async fn comment_on_unknown_case_rejected<E, F, Fut>(factory: &F) -> Result<(), String>
where
    E: ExecutionEngine,
    F: Fn() -> Fut,
    Fut: Future<Output = E>,
{
    let engine = factory().await;
    match engine
        .add_comment("no-such-case", "no-such-task", "someone", "hello")
        .await
    {
        Err(EngineError::CaseNotFound { .. }) => Ok(()),
        Err(other) => Err(format!("expected CaseNotFound, got {other}")),
        Ok(()) => Err("comment on unknown case accepted".to_string()),
    }
}
