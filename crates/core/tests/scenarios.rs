//! End-to-end case lifecycles through the `Workflow` facade over the
//! in-memory engine.

use std::sync::Arc;

use approvals_core::audit::{
    PROCESS_ENDED, PROCESS_START, TASK_APPROVED, TASK_COMPLETED, TASK_CREATED, TASK_ENDED,
};
use approvals_core::{
    ActionRequest, AuditListener, DecisionRequest, ErrorKind, MemoryAuditSink, ProcessState,
    RequestContext, StartCaseRequest, Workflow, WorkflowError,
};
use approvals_engine::{
    CommentRecord, EngineError, ExecutionEngine, HistoricActivityRecord, HistoricVariableRecord,
    InMemoryEngine, TaskQuery, TaskRecord, VariableMap,
};
use async_trait::async_trait;
use serde_json::{json, Value};

struct Harness {
    engine: Arc<InMemoryEngine>,
    audit: Arc<MemoryAuditSink>,
    workflow: Arc<Workflow>,
}

fn harness() -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine =
        Arc::new(InMemoryEngine::new().with_listener(Arc::new(AuditListener::new(audit.clone()))));
    let workflow = Arc::new(Workflow::new(engine.clone(), audit.clone()));
    Harness {
        engine,
        audit,
        workflow,
    }
}

fn as_user(user: &str) -> RequestContext {
    RequestContext::acting_as(user, &[])
}

fn start_request(approver: &str, executor: &str) -> StartCaseRequest {
    StartCaseRequest {
        initiator: None,
        approver_id: Some(approver.into()),
        executor_id: Some(executor.into()),
        payload: json!({"amount": 100}).as_object().cloned(),
    }
}

fn comment(text: &str) -> DecisionRequest {
    DecisionRequest {
        comment: Some(text.into()),
        ..DecisionRequest::default()
    }
}

async fn start(h: &Harness, n: u32) -> (String, String) {
    let started = h
        .workflow
        .start_case(
            &as_user(&format!("initiator-{n}")),
            start_request(&format!("approver-{n}"), &format!("executor-{n}")),
        )
        .await
        .unwrap();
    assert_eq!(started.state, ProcessState::ApprovalPending);
    let task = started.current_task.expect("approval task");
    (started.case_id, task.task_id)
}

#[tokio::test]
async fn approve_then_complete() {
    let h = harness();
    let (case_id, approval) = start(&h, 1).await;

    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::ApprovalPending));
    assert_eq!(
        status.current_task.as_ref().map(|t| t.task_id.as_str()),
        Some(approval.as_str())
    );
    let pending: Vec<(&str, Option<&str>)> = status
        .history
        .iter()
        .filter(|e| e.activity_type == "userTask")
        .map(|e| (e.activity_id.as_str(), e.result.as_deref()))
        .collect();
    assert_eq!(pending, vec![("approvalTask", None)]);

    let approved = h
        .workflow
        .approve(&as_user("approver-1"), &approval, comment("Looks good"))
        .await
        .unwrap();
    assert_eq!(approved.next_state, ProcessState::ManualPending);

    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::ManualPending));
    let manual = status.current_task.expect("manual task");
    let record = h.engine.task(&manual.task_id).await.unwrap().unwrap();
    assert_eq!(record.assignee.as_deref(), Some("executor-1"));

    let done = h
        .workflow
        .complete(
            &as_user("executor-1"),
            &manual.task_id,
            ActionRequest {
                user_id: None,
                comment: Some("Manual step done".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, "COMPLETED");

    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::Completed));
    assert!(status.current_task.is_none());
    assert_eq!(status.variables["lastComment"], json!("Manual step done"));
    assert_eq!(status.variables["lastOperator"], json!("executor-1"));
    assert_eq!(status.variables["approvalResult"], json!("APPROVED"));
    assert_eq!(status.variables["payload"], json!({"amount": 100}));

    let results: Vec<(&str, Option<&str>)> = status
        .history
        .iter()
        .filter(|e| e.activity_type == "userTask")
        .map(|e| (e.activity_id.as_str(), e.result.as_deref()))
        .collect();
    assert_eq!(
        results,
        vec![
            ("approvalTask", Some("APPROVED")),
            ("manualTask", Some("COMPLETED")),
        ]
    );
    assert!(status
        .history
        .iter()
        .filter(|e| e.activity_type != "userTask")
        .all(|e| e.result.is_none()));
    assert!(status.history.iter().all(|e| e.end_time.is_some()));

    let messages: Vec<String> = h
        .engine
        .comments(&case_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.message)
        .collect();
    assert_eq!(messages, vec!["Looks good", "Manual step done"]);

    // Engine lifecycle events land in the same trail as the operations.
    let events = h.audit.event_types();
    for expected in [PROCESS_START, TASK_APPROVED, TASK_CREATED, PROCESS_ENDED] {
        assert!(events.iter().any(|e| e == expected), "missing {expected}");
    }
    assert_eq!(events.last().map(String::as_str), Some(TASK_COMPLETED));
}

#[tokio::test]
async fn approval_alone_records_no_completion() {
    let h = harness();
    let (_, approval) = start(&h, 9).await;
    h.workflow
        .approve(&as_user("approver-9"), &approval, DecisionRequest::default())
        .await
        .unwrap();

    let events = h.audit.events();
    assert!(
        events.iter().all(|e| e.event_type != TASK_COMPLETED),
        "{events:?}"
    );
    let ended: Vec<_> = events.iter().filter(|e| e.event_type == TASK_ENDED).collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].task_id.as_deref(), Some(approval.as_str()));
    assert_eq!(ended[0].operator.as_deref(), Some("approver-9"));
    assert_eq!(
        h.audit.event_types(),
        vec![
            "PROCESS_STARTED",
            "TASK_CREATED",
            "PROCESS_START",
            "TASK_ENDED",
            "TASK_CREATED",
            "TASK_APPROVED",
        ]
    );
}

#[tokio::test]
async fn reject_ends_case_without_executor_task() {
    let h = harness();
    let (case_id, approval) = start(&h, 2).await;

    let rejected = h
        .workflow
        .reject(
            &as_user("approver-2"),
            &approval,
            DecisionRequest {
                reason: Some("Insufficient data".into()),
                ..DecisionRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, "REJECTED");
    assert_eq!(rejected.next_state, ProcessState::Rejected);

    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::Rejected));
    assert!(status.current_task.is_none());
    assert_eq!(status.variables["lastComment"], json!("Insufficient data"));
    assert!(status
        .history
        .iter()
        .all(|e| e.activity_id != "manualTask"));
    let approval_row = status
        .history
        .iter()
        .find(|e| e.activity_id == "approvalTask")
        .expect("approval activity");
    assert_eq!(approval_row.result.as_deref(), Some("REJECTED"));
    assert!(approval_row.end_time.is_some());

    let executor_tasks = h
        .workflow
        .find_tasks(&as_user("executor-2"), Some("auditor"), None)
        .await
        .unwrap();
    assert!(executor_tasks.is_empty());
}

#[tokio::test]
async fn wrong_approver_is_refused() {
    let h = harness();
    let started = h
        .workflow
        .start_case(&as_user("initiator-3"), start_request("approver-4", "executor-4"))
        .await
        .unwrap();
    let task_id = started.current_task.unwrap().task_id;

    let err = h
        .workflow
        .approve(&as_user("approver-3"), &task_id, comment("mine now"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotAssigned { .. }));
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let status = h.workflow.status(&started.case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::ApprovalPending));
    assert_eq!(status.variables["lastOperator"], json!("initiator-3"));
    assert_eq!(
        status.current_task.map(|t| t.task_id),
        Some(task_id.clone())
    );
}

#[tokio::test]
async fn terminal_status_matches_last_live_status() {
    let h = harness();
    let (case_id, approval) = start(&h, 5).await;
    h.workflow
        .approve(&as_user("approver-5"), &approval, comment("ok"))
        .await
        .unwrap();
    let manual = h.engine.active_task(&case_id).await.unwrap().unwrap();

    let live_before = h
        .engine
        .read_variable(&case_id, "processStatus")
        .await
        .unwrap();
    assert_eq!(live_before, Some(json!("MANUAL_PENDING")));

    h.workflow
        .complete(&as_user("executor-5"), &manual.id, ActionRequest::default())
        .await
        .unwrap();
    assert!(h
        .engine
        .read_variable(&case_id, "processStatus")
        .await
        .unwrap_err()
        .is_live_miss());

    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::Completed));
}

#[tokio::test]
async fn offline_live_store_falls_back_to_history() {
    let h = harness();
    let (case_id, _) = start(&h, 6).await;
    let live = h.workflow.status(&case_id).await.unwrap();

    h.engine.set_live_reads_available(false);
    let fallback = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(fallback.state, live.state);
    assert_eq!(fallback.variables, live.variables);
    assert_eq!(fallback.current_task, live.current_task);
}

#[tokio::test]
async fn at_most_one_active_task_per_case() {
    let h = harness();
    let (case_id, approval) = start(&h, 7).await;
    let count = |engine: Arc<InMemoryEngine>, case_id: String| async move {
        engine
            .find_tasks(&TaskQuery::default().for_case(case_id))
            .await
            .unwrap()
            .len()
    };
    assert_eq!(count(h.engine.clone(), case_id.clone()).await, 1);
    h.workflow
        .approve(&as_user("approver-7"), &approval, comment("ok"))
        .await
        .unwrap();
    assert_eq!(count(h.engine.clone(), case_id.clone()).await, 1);
    let manual = h.engine.active_task(&case_id).await.unwrap().unwrap();
    h.workflow
        .complete(&as_user("executor-7"), &manual.id, ActionRequest::default())
        .await
        .unwrap();
    assert_eq!(count(h.engine.clone(), case_id).await, 0);
}

#[tokio::test]
async fn role_listing_never_crosses_step_kinds() {
    let h = harness();
    let mut approved = Vec::new();
    for _ in 0..3 {
        let started = h
            .workflow
            .start_case(&as_user("initiator"), start_request("u", "u"))
            .await
            .unwrap();
        approved.push(started.current_task.unwrap().task_id);
    }
    h.workflow
        .approve(&as_user("u"), &approved[0], DecisionRequest::default())
        .await
        .unwrap();

    let ctx = RequestContext::new(approvals_core::Identity::from_headers(
        Some("u"),
        Some("Approver, executor"),
    ));
    let approvals = h.workflow.find_tasks(&ctx, None, None).await.unwrap();
    assert_eq!(approvals.len(), 2);
    assert!(approvals.iter().all(|t| t.task_name == "Approve request"));

    let manual = h
        .workflow
        .find_tasks(&ctx, Some("EXECUTOR"), None)
        .await
        .unwrap();
    assert_eq!(manual.len(), 1);
    assert!(manual.iter().all(|t| t.task_name == "Perform manual step"));
}

#[tokio::test]
async fn racing_approvals_commit_once() {
    let h = harness();
    let (case_id, approval) = start(&h, 8).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let workflow = h.workflow.clone();
        let task_id = approval.clone();
        handles.push(tokio::spawn(async move {
            workflow
                .approve(&as_user("approver-8"), &task_id, DecisionRequest::default())
                .await
        }));
    }
    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::Conflict
            )),
        }
    }
    assert_eq!(wins, 1);
    let approvals = h
        .audit
        .event_types()
        .into_iter()
        .filter(|t| t == TASK_APPROVED)
        .count();
    assert_eq!(approvals, 1);
    let status = h.workflow.status(&case_id).await.unwrap();
    assert_eq!(status.state, Some(ProcessState::ManualPending));
}

/// Delegates to an in-memory engine but fails live reads with a backend
/// error instead of a live miss.
struct BrokenLiveStore(InMemoryEngine);

#[async_trait]
impl ExecutionEngine for BrokenLiveStore {
    async fn create_case(&self, key: &str, vars: VariableMap) -> Result<String, EngineError> {
        self.0.create_case(key, vars).await
    }
    async fn is_active(&self, case_id: &str) -> Result<bool, EngineError> {
        self.0.is_active(case_id).await
    }
    async fn active_task(&self, case_id: &str) -> Result<Option<TaskRecord>, EngineError> {
        self.0.active_task(case_id).await
    }
    async fn task(&self, task_id: &str) -> Result<Option<TaskRecord>, EngineError> {
        self.0.task(task_id).await
    }
    async fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, EngineError> {
        self.0.find_tasks(query).await
    }
    async fn complete_task(&self, task_id: &str, vars: VariableMap) -> Result<(), EngineError> {
        self.0.complete_task(task_id, vars).await
    }
    async fn add_comment(
        &self,
        case_id: &str,
        task_id: &str,
        author: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        self.0.add_comment(case_id, task_id, author, message).await
    }
    async fn comments(&self, case_id: &str) -> Result<Vec<CommentRecord>, EngineError> {
        self.0.comments(case_id).await
    }
    async fn read_variable(&self, _: &str, _: &str) -> Result<Option<Value>, EngineError> {
        Err(EngineError::Backend("live store corrupted".into()))
    }
    async fn read_variables(&self, _: &str) -> Result<VariableMap, EngineError> {
        Err(EngineError::Backend("live store corrupted".into()))
    }
    async fn read_historic_variable(
        &self,
        case_id: &str,
        name: &str,
    ) -> Result<Option<Value>, EngineError> {
        self.0.read_historic_variable(case_id, name).await
    }
    async fn read_historic_variables(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricVariableRecord>, EngineError> {
        self.0.read_historic_variables(case_id).await
    }
    async fn read_historic_activities(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricActivityRecord>, EngineError> {
        self.0.read_historic_activities(case_id).await
    }
}

#[tokio::test]
async fn arbitrary_live_failures_are_not_masked_by_history() {
    let engine = Arc::new(BrokenLiveStore(InMemoryEngine::new()));
    let workflow = Workflow::new(engine, Arc::new(MemoryAuditSink::new()));
    let started = workflow
        .start_case(&as_user("i"), start_request("a", "e"))
        .await
        .unwrap();
    let err = workflow.status(&started.case_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}
