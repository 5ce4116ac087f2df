//! Process Orchestrator: starts cases.

use std::sync::Arc;

use approvals_engine::{ExecutionEngine, APPROVAL_PROCESS_KEY};

use crate::audit::{AuditEvent, AuditSink, PROCESS_START};
use crate::error::WorkflowError;
use crate::identity::RequestContext;
use crate::model::{StartCaseRequest, StartCaseResponse, TaskSummary};
use crate::variables::{initial_variables, ProcessState, APPROVER_ID, EXECUTOR_ID};

pub struct Orchestrator {
    engine: Arc<dyn ExecutionEngine>,
    audit: Arc<dyn AuditSink>,
    definition_key: String,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ExecutionEngine>, audit: Arc<dyn AuditSink>) -> Self {
        Orchestrator {
            engine,
            audit,
            definition_key: APPROVAL_PROCESS_KEY.to_string(),
        }
    }

    /// Start cases of `key` instead of the approval process.
    pub fn with_definition_key(mut self, key: impl Into<String>) -> Self {
        self.definition_key = key.into();
        self
    }

    /// Start a case and return it with its first pending task.
    ///
    /// The initiator comes from the request, else the ambient identity. A
    /// case whose engine creates no task synchronously is returned without
    /// one.
    pub async fn start_case(
        &self,
        ctx: &RequestContext,
        request: StartCaseRequest,
    ) -> Result<StartCaseResponse, WorkflowError> {
        let initiator = ctx.require_user_id(request.initiator.as_deref())?;
        let approver_id = normalize_participant(request.approver_id.as_deref(), APPROVER_ID)?;
        let executor_id = normalize_participant(request.executor_id.as_deref(), EXECUTOR_ID)?;
        let payload = request.payload.unwrap_or_default();

        let variables = initial_variables(&initiator, &approver_id, &executor_id, &payload);
        let case_id = self
            .engine
            .create_case(&self.definition_key, variables)
            .await?;
        let task = self.engine.active_task(&case_id).await?;

        let state = ProcessState::ApprovalPending;
        self.audit.record(AuditEvent::operation(
            PROCESS_START,
            &case_id,
            task.as_ref().map(|t| t.id.as_str()),
            &initiator,
            state.as_str(),
        ));
        tracing::debug!(case_id = %case_id, initiator = %initiator, "case started");

        Ok(StartCaseResponse {
            case_id,
            state,
            current_task: task.as_ref().map(TaskSummary::from),
        })
    }
}

fn normalize_participant(
    value: Option<&str>,
    field: &'static str,
) -> Result<String, WorkflowError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(WorkflowError::InvalidParticipant { field })
}
