//! Orchestration core for two-step approval workflows.
//!
//! An initiator starts a case, the approver approves or rejects it, and on
//! approval the executor completes a manual step. The core authorizes who
//! may act on which task, drives each case through its states by asking
//! the execution engine to complete tasks, resolves status from live or
//! historic engine data, and records an audit trail. All case state lives
//! in the engine ([`approvals_engine::ExecutionEngine`]); nothing is kept
//! here between calls.

pub mod audit;
mod error;
pub mod identity;
pub mod model;
pub mod orchestrator;
pub mod status;
pub mod tasks;
pub mod variables;

use std::sync::Arc;

use approvals_engine::ExecutionEngine;

pub use audit::{AuditEvent, AuditListener, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::{ErrorKind, IdentityPart, WorkflowError};
pub use identity::{Identity, RequestContext, ROLES_HEADER, USER_HEADER};
pub use model::{
    ActionRequest, DecisionRequest, HistoryEntry, ProcessStatus, StartCaseRequest,
    StartCaseResponse, TaskListItem, TaskOperationResponse, TaskSummary,
};
pub use orchestrator::Orchestrator;
pub use status::StatusResolver;
pub use tasks::TaskService;
pub use variables::{ApprovalResult, ProcessState, ProcessVariables, TaskKind};

/// The three core services over one engine and audit sink.
pub struct Workflow {
    orchestrator: Orchestrator,
    tasks: TaskService,
    status: StatusResolver,
}

impl Workflow {
    pub fn new(engine: Arc<dyn ExecutionEngine>, audit: Arc<dyn AuditSink>) -> Self {
        Workflow {
            orchestrator: Orchestrator::new(engine.clone(), audit.clone()),
            tasks: TaskService::new(engine.clone(), audit),
            status: StatusResolver::new(engine),
        }
    }

    /// Start cases of the definition `key`.
    pub fn with_definition_key(mut self, key: impl Into<String>) -> Self {
        self.orchestrator = self.orchestrator.with_definition_key(key);
        self
    }

    pub async fn start_case(
        &self,
        ctx: &RequestContext,
        request: StartCaseRequest,
    ) -> Result<StartCaseResponse, WorkflowError> {
        self.orchestrator.start_case(ctx, request).await
    }

    pub async fn find_tasks(
        &self,
        ctx: &RequestContext,
        role: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<TaskListItem>, WorkflowError> {
        self.tasks.find_tasks(ctx, role, user_id).await
    }

    pub async fn approve(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: DecisionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        self.tasks.approve(ctx, task_id, request).await
    }

    pub async fn reject(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: DecisionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        self.tasks.reject(ctx, task_id, request).await
    }

    pub async fn complete(
        &self,
        ctx: &RequestContext,
        task_id: &str,
        request: ActionRequest,
    ) -> Result<TaskOperationResponse, WorkflowError> {
        self.tasks.complete(ctx, task_id, request).await
    }

    pub async fn status(&self, case_id: &str) -> Result<ProcessStatus, WorkflowError> {
        self.status.status(case_id).await
    }
}
