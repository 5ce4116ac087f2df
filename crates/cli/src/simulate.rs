//! `approvals simulate` -- run one case through its lifecycle in process.

use std::sync::Arc;

use approvals_core::{
    ActionRequest, AuditListener, DecisionRequest, ProcessStatus, ProcessVariables,
    RequestContext, StartCaseRequest, TracingAuditSink, Workflow,
};
use approvals_engine::InMemoryEngine;

use crate::{Decision, OutputFormat};

pub(crate) struct SimulateOptions {
    pub(crate) decision: Decision,
    pub(crate) initiator: String,
    pub(crate) approver: String,
    pub(crate) executor: String,
    /// JSON object text.
    pub(crate) payload: Option<String>,
    pub(crate) comment: Option<String>,
}

/// Start a case, decide it, complete the manual step when approved, and
/// return the final status.
pub(crate) async fn simulate(
    options: SimulateOptions,
) -> Result<ProcessStatus, Box<dyn std::error::Error>> {
    let payload = match options.payload.as_deref() {
        Some(text) => match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(map) => Some(map),
            _ => return Err("--payload must be a JSON object".into()),
        },
        None => None,
    };

    let audit = Arc::new(TracingAuditSink);
    let engine = InMemoryEngine::new().with_listener(Arc::new(AuditListener::new(audit.clone())));
    let workflow = Workflow::new(Arc::new(engine), audit);

    let started = workflow
        .start_case(
            &RequestContext::acting_as(&options.initiator, &[]),
            StartCaseRequest {
                initiator: None,
                approver_id: Some(options.approver.clone()),
                executor_id: Some(options.executor.clone()),
                payload,
            },
        )
        .await?;
    let case_id = started.case_id;
    let Some(approval) = started.current_task else {
        return Ok(workflow.status(&case_id).await?);
    };

    let approver = RequestContext::acting_as(&options.approver, &["approver"]);
    match options.decision {
        Decision::Approve => {
            let request = DecisionRequest {
                user_id: None,
                comment: options.comment.clone(),
                reason: None,
            };
            workflow
                .approve(&approver, &approval.task_id, request)
                .await?;
            let executor = RequestContext::acting_as(&options.executor, &["executor"]);
            let manual = workflow.find_tasks(&executor, None, None).await?;
            for task in manual.iter().filter(|t| t.case_id == case_id) {
                let request = ActionRequest {
                    user_id: None,
                    comment: options.comment.clone(),
                };
                workflow.complete(&executor, &task.task_id, request).await?;
            }
        }
        Decision::Reject => {
            let request = DecisionRequest {
                user_id: None,
                comment: options.comment.clone(),
                reason: Some("Rejected in simulation".to_string()),
            };
            workflow
                .reject(&approver, &approval.task_id, request)
                .await?;
        }
    }

    Ok(workflow.status(&case_id).await?)
}

pub(crate) async fn cmd_simulate(
    options: SimulateOptions,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = simulate(options).await?;
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            let state = status
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "UNRESOLVED".to_string());
            println!("case {}: {}", status.case_id, state);
            println!("  {}", last_action(&status));
            for entry in &status.history {
                println!(
                    "  {:<16} {:<18} {:<12} {}",
                    entry.activity_id,
                    entry.activity_type,
                    entry.assignee.as_deref().unwrap_or("-"),
                    entry.result.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

/// Who acted last on the case, and what they said.
fn last_action(status: &ProcessStatus) -> String {
    let vars = ProcessVariables::decode(&status.variables);
    let operator = vars.last_operator.unwrap_or_else(|| "-".to_string());
    match vars.last_comment {
        Some(comment) => format!("last operator: {operator} ({comment})"),
        None => format!("last operator: {operator}"),
    }
}
