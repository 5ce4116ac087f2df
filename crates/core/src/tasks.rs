//! Task Authorization & Action Service.
//!
//! Lists the tasks a user may act on and performs approve, reject and
//! complete. The only authorization rule is that the acting user is the
//! task's assignee, compared exactly. Out-of-order actions are guarded by
//! the engine: once a case moves on, the old task no longer exists.

use std::sync::Arc;

use approvals_engine::{ExecutionEngine, TaskQuery, TaskRecord};

use crate::audit::{AuditEvent, AuditSink, TASK_APPROVED, TASK_COMPLETED, TASK_REJECTED};
use crate::error::WorkflowError;
use crate::identity::RequestContext;
use crate::model::{timestamp, ActionRequest, DecisionRequest, TaskListItem, TaskOperationResponse};
use crate::variables::{
    payload_of, ApprovalResult, ProcessState, TaskKind, VariableDelta, PAYLOAD,
};

/// One of the three task actions with its inputs.
#[derive(Debug, Clone)]
enum Action {
    Approve {
        comment: Option<String>,
    },
    Reject {
        reason: Option<String>,
        comment: Option<String>,
    },
    Complete {
        comment: Option<String>,
    },
}

impl Action {
    fn event_type(&self) -> &'static str {
        match self {
            Action::Approve { .. } => TASK_APPROVED,
            Action::Reject { .. } => TASK_REJECTED,
            Action::Complete { .. } => TASK_COMPLETED,
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Action::Approve { .. } => ApprovalResult::Approved.as_str(),
            Action::Reject { .. } => ApprovalResult::Rejected.as_str(),
            Action::Complete { .. } => ProcessState::Completed.as_str(),
        }
    }

    fn delta(&self, operator: &str) -> VariableDelta {
        match self {
            Action::Approve { comment } => VariableDelta::approve(operator, comment.as_deref()),
            Action::Reject { reason, comment } => {
                VariableDelta::reject(operator, reason.as_deref(), comment.as_deref())
            }
            Action::Complete { comment } => VariableDelta::complete(operator, comment.as_deref()),
        }
    }

    /// The text attached to the case's comment trail, if any.
    fn comment_text(&self) -> Option<String> {
        match self {
            Action::Approve { comment } | Action::Complete { comment } => {
                non_blank(comment.as_deref()).map(str::to_string)
            }
            Action::Reject { reason, comment } => {
                merge_reason_and_comment(reason.as_deref(), comment.as_deref())
            }
        }
    }
}

/// `"{reason} | {comment}"` when both are present, else whichever is.
fn merge_reason_and_comment(reason: Option<&str>, comment: Option<&str>) -> Option<String> {
    match (non_blank(reason), non_blank(comment)) {
        (Some(r), Some(c)) => Some(format!("{r} | {c}")),
        (Some(r), None) => Some(r.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct TaskService {
    engine: Arc<dyn ExecutionEngine>,
    audit: Arc<dyn AuditSink>,
}

impl TaskService {
    pub fn new(engine: Arc<dyn ExecutionEngine>, audit: Arc<dyn AuditSink>) -> Self {
        TaskService { engine, audit }
    }

    /// Tasks assigned to the acting user, newest first.
    ///
    /// Role `approver` narrows to approval tasks and `executor` to manual
    /// tasks; any other role sees every task assigned to the user.
    pub async fn find_tasks(
        &self,
        ctx: &RequestContext,
        role: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<TaskListItem>, WorkflowError> {
        let user_id = ctx.require_user_id(user_id)?;
        let role = ctx.require_role(role)?;

        let mut query = TaskQuery::assigned_to(user_id);
        if let Some(kind) = TaskKind::for_role(&role) {
            query = query.with_definition_key(kind.definition_key());
        }
        let mut tasks = self.engine.find_tasks(&query).await?;
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });

        let mut items = Vec::with_capacity(tasks.len());
        for task in &tasks {
            items.push(self.list_item(task).await?);
        }
        Ok(items)
    }

    async fn list_item(&self, task: &TaskRecord) -> Result<TaskListItem, WorkflowError> {
        let payload = match self.engine.read_variable(&task.case_id, PAYLOAD).await {
            Ok(value) => payload_of(value.as_ref()),
            Err(e) if e.is_live_miss() => {
                tracing::debug!(case_id = %task.case_id, error = %e, "payload not readable");
                serde_json::Map::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(TaskListItem {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            case_id: task.case_id.clone(),
            created_at: timestamp(task.created_at),
            payload,
        })
    }

    pub async fn approve(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: DecisionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        let action = Action::Approve {
            comment: request.comment,
        };
        self.act(ctx, task_id, request.user_id.as_deref(), action).await
    }

    pub async fn reject(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: DecisionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        let action = Action::Reject {
            reason: request.reason,
            comment: request.comment,
        };
        self.act(ctx, task_id, request.user_id.as_deref(), action).await
    }

    pub async fn complete(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: ActionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        let action = Action::Complete {
            comment: request.comment,
        };
        self.act(ctx, task_id, request.user_id.as_deref(), action).await
    }

    async fn act(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        user_override: Option<&str>,
        action: Action,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        let result = self.try_act(ctx, task_id, user_override, &action).await;
        if let Err(e) = &result {
            tracing::warn!(
                task_id,
                action = action.event_type(),
                error = %e,
                "task action failed"
            );
        }
        result
    }

    async fn try_act(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        user_override: Option<&str>,
        action: &Action,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        let task = self
            .engine
            .task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        let operator = ctx.require_user_id(user_override)?;
        ensure_assignee(&task, &operator)?;

        let delta = action.delta(&operator);
        let next_state = delta.process_status;

        // Completion is the commit point; nothing is written before it.
        self.engine
            .complete_task(&task.id, delta.into_variables())
            .await?;

        if let Some(text) = action.comment_text() {
            if let Err(e) = self
                .engine
                .add_comment(&task.case_id, &task.id, &operator, &text)
                .await
            {
                tracing::warn!(
                    case_id = %task.case_id,
                    task_id = %task.id,
                    error = %e,
                    "comment not recorded"
                );
            }
        }

        self.audit.record(AuditEvent::operation(
            action.event_type(),
            &task.case_id,
            Some(task_id),
            &operator,
            action.status(),
        ));

        Ok(TaskOperationResponse {
            task_id: task_id.to_string(),
            status: action.status().to_string(),
            next_state,
        })
    }
}

fn ensure_assignee(task: &TaskRecord, user_id: &str) -> Result<(), WorkflowError> {
    if task.assignee.as_deref() == Some(user_id) {
        Ok(())
    } else {
        Err(WorkflowError::NotAssigned {
            task_id: task.id.clone(),
            user_id: user_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::model::StartCaseRequest;
    use crate::orchestrator::Orchestrator;
    use approvals_engine::InMemoryEngine;
    use serde_json::json;

    struct Fixture {
        engine: Arc<InMemoryEngine>,
        audit: Arc<MemoryAuditSink>,
        orchestrator: Orchestrator,
        tasks: TaskService,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(InMemoryEngine::new());
        let audit = Arc::new(MemoryAuditSink::new());
        Fixture {
            orchestrator: Orchestrator::new(engine.clone(), audit.clone()),
            tasks: TaskService::new(engine.clone(), audit.clone()),
            engine,
            audit,
        }
    }

    async fn start(f: &Fixture, approver: &str, executor: &str) -> (String, String) {
        let started = f
            .orchestrator
            .start_case(
                &RequestContext::acting_as("initiator", &[]),
                StartCaseRequest {
                    initiator: None,
                    approver_id: Some(approver.into()),
                    executor_id: Some(executor.into()),
                    payload: json!({"amount": 100}).as_object().cloned(),
                },
            )
            .await
            .unwrap();
        let task_id = started.current_task.unwrap().task_id;
        (started.case_id, task_id)
    }

    fn decision(comment: Option<&str>, reason: Option<&str>) -> DecisionRequest {
        DecisionRequest {
            user_id: None,
            comment: comment.map(str::to_string),
            reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn reason_and_comment_merge() {
        assert_eq!(
            merge_reason_and_comment(Some("Insufficient data"), Some("resubmit")).as_deref(),
            Some("Insufficient data | resubmit")
        );
        assert_eq!(
            merge_reason_and_comment(Some(" "), Some("resubmit")).as_deref(),
            Some("resubmit")
        );
        assert_eq!(merge_reason_and_comment(None, Some("")), None);
    }

    #[tokio::test]
    async fn approve_writes_delta_comment_and_audit() {
        let f = fixture();
        let (case_id, task_id) = start(&f, "approver-1", "executor-1").await;
        let ctx = RequestContext::acting_as("approver-1", &["approver"]);

        let response = f
            .tasks
            .approve(&ctx, &task_id, decision(Some("Looks good"), None))
            .await
            .unwrap();
        assert_eq!(response.status, "APPROVED");
        assert_eq!(response.next_state, ProcessState::ManualPending);

        let vars = f.engine.read_variables(&case_id).await.unwrap();
        assert_eq!(vars["approvalResult"], json!("APPROVED"));
        assert_eq!(vars["lastComment"], json!("Looks good"));
        assert_eq!(vars["lastOperator"], json!("approver-1"));

        let comments = f.engine.comments(&case_id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "approver-1");

        assert_eq!(
            f.audit.event_types(),
            vec!["PROCESS_START", "TASK_APPROVED"]
        );
    }

    #[tokio::test]
    async fn reject_merges_reason_into_comment_trail() {
        let f = fixture();
        let (case_id, task_id) = start(&f, "approver-2", "executor-2").await;
        let ctx = RequestContext::acting_as("approver-2", &[]);
        let response = f
            .tasks
            .reject(
                &ctx,
                &task_id,
                decision(Some("please resubmit"), Some("Insufficient data")),
            )
            .await
            .unwrap();
        assert_eq!(response.next_state, ProcessState::Rejected);

        let comments = f.engine.comments(&case_id).await.unwrap();
        assert_eq!(comments[0].message, "Insufficient data | please resubmit");
        let last = f
            .engine
            .read_historic_variable(&case_id, "lastComment")
            .await
            .unwrap();
        assert_eq!(last, Some(json!("Insufficient data")));
    }

    #[tokio::test]
    async fn blank_comment_is_not_recorded() {
        let f = fixture();
        let (case_id, task_id) = start(&f, "a", "e").await;
        f.tasks
            .approve(
                &RequestContext::acting_as("a", &[]),
                &task_id,
                decision(Some("   "), None),
            )
            .await
            .unwrap();
        assert!(f.engine.comments(&case_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_user_is_not_assigned_and_nothing_changes() {
        let f = fixture();
        let (case_id, task_id) = start(&f, "approver-4", "executor-4").await;
        let ctx = RequestContext::acting_as("approver-3", &["approver"]);
        let err = f
            .tasks
            .approve(&ctx, &task_id, decision(Some("sneaky"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAssigned { .. }));

        let status = f
            .engine
            .read_variable(&case_id, "processStatus")
            .await
            .unwrap();
        assert_eq!(status, Some(json!("APPROVAL_PENDING")));
        assert!(f.engine.task(&task_id).await.unwrap().is_some());
        assert!(f.engine.comments(&case_id).await.unwrap().is_empty());
        assert_eq!(f.audit.event_types(), vec!["PROCESS_START"]);
    }

    #[tokio::test]
    async fn assignee_match_is_case_sensitive() {
        let f = fixture();
        let (_, task_id) = start(&f, "Approver-1", "e").await;
        let err = f
            .tasks
            .approve(
                &RequestContext::acting_as("approver-1", &[]),
                &task_id,
                decision(None, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAssigned { .. }));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found_before_identity_check() {
        let f = fixture();
        let err = f
            .tasks
            .complete(&RequestContext::anonymous(), "task-404", ActionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn body_user_overrides_header_user() {
        let f = fixture();
        let (_, task_id) = start(&f, "approver-1", "e").await;
        let mut req = decision(None, None);
        req.user_id = Some("approver-1".into());
        f.tasks
            .approve(&RequestContext::acting_as("someone-else", &[]), &task_id, req)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_approval_loses_the_race() {
        let f = fixture();
        let (_, task_id) = start(&f, "a", "e").await;
        let ctx = RequestContext::acting_as("a", &[]);
        f.tasks
            .approve(&ctx, &task_id, decision(None, None))
            .await
            .unwrap();
        let err = f
            .tasks
            .approve(&ctx, &task_id, decision(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn listing_filters_by_role_and_orders_newest_first() {
        let f = fixture();
        let (_, older) = start(&f, "u", "u").await;
        let (_, newer) = start(&f, "u", "u").await;
        let (_, to_approve_then_execute) = start(&f, "u", "u").await;
        let ctx = RequestContext::acting_as("u", &["approver"]);
        f.tasks
            .approve(&ctx, &to_approve_then_execute, decision(None, None))
            .await
            .unwrap();

        let approvals = f.tasks.find_tasks(&ctx, None, None).await.unwrap();
        let ids: Vec<&str> = approvals.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec![newer.as_str(), older.as_str()]);
        assert_eq!(approvals[0].payload["amount"], json!(100));

        let manual = f
            .tasks
            .find_tasks(&ctx, Some("executor"), None)
            .await
            .unwrap();
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].task_name, "Perform manual step");

        let all = f
            .tasks
            .find_tasks(&ctx, Some("auditor"), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn listing_requires_role() {
        let f = fixture();
        let ctx = RequestContext::acting_as("u", &[]);
        let err = f.tasks.find_tasks(&ctx, None, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingIdentity(_)));
    }
}
