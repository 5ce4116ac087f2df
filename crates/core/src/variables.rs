//! Process Variable Model.
//!
//! The engine stores case variables as opaque JSON values. This module
//! names the fixed fields the core reads and writes, decodes the ones it
//! interprets (`processStatus`, `approvalResult`) into concrete types, and
//! builds the variable writes for case creation and each action. The
//! `payload` mapping is carried but never interpreted.

use std::fmt;

use approvals_engine::{VariableMap, APPROVAL_TASK, MANUAL_TASK};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INITIATOR: &str = "initiator";
pub const APPROVER_ID: &str = "approverId";
pub const EXECUTOR_ID: &str = "executorId";
pub const PROCESS_STATUS: &str = "processStatus";
pub const APPROVAL_RESULT: &str = "approvalResult";
pub const LAST_COMMENT: &str = "lastComment";
pub const LAST_OPERATOR: &str = "lastOperator";
pub const PAYLOAD: &str = "payload";

/// Lifecycle state of a case.
///
/// `APPROVAL_PENDING -> {MANUAL_PENDING, REJECTED}`,
/// `MANUAL_PENDING -> COMPLETED`. `REJECTED` and `COMPLETED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    ApprovalPending,
    ManualPending,
    Completed,
    Rejected,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::ApprovalPending => "APPROVAL_PENDING",
            ProcessState::ManualPending => "MANUAL_PENDING",
            ProcessState::Completed => "COMPLETED",
            ProcessState::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<ProcessState> {
        match s {
            "APPROVAL_PENDING" => Some(ProcessState::ApprovalPending),
            "MANUAL_PENDING" => Some(ProcessState::ManualPending),
            "COMPLETED" => Some(ProcessState::Completed),
            "REJECTED" => Some(ProcessState::Rejected),
            _ => None,
        }
    }

    /// Decode an engine value. Null or absent is unresolved; a value that is
    /// not a known state name is logged and also treated as unresolved.
    pub fn from_value(value: Option<&Value>) -> Option<ProcessState> {
        match value? {
            Value::Null => None,
            Value::String(s) => {
                let state = ProcessState::parse(s);
                if state.is_none() {
                    tracing::warn!(value = %s, "unrecognised processStatus value");
                }
                state
            }
            other => {
                tracing::warn!(value = %other, "processStatus is not a string");
                None
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Completed | ProcessState::Rejected)
    }

    pub fn can_transition_to(self, next: ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::ApprovalPending, ProcessState::ManualPending)
                | (ProcessState::ApprovalPending, ProcessState::Rejected)
                | (ProcessState::ManualPending, ProcessState::Completed)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two user-task steps of an approval case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Approval,
    Manual,
}

impl TaskKind {
    /// Engine definition key of the step.
    pub fn definition_key(self) -> &'static str {
        match self {
            TaskKind::Approval => APPROVAL_TASK,
            TaskKind::Manual => MANUAL_TASK,
        }
    }

    pub fn from_definition_key(key: &str) -> Option<TaskKind> {
        match key {
            APPROVAL_TASK => Some(TaskKind::Approval),
            MANUAL_TASK => Some(TaskKind::Manual),
            _ => None,
        }
    }

    /// The step a role is narrowed to when listing tasks. Roles other than
    /// `approver` and `executor` are not narrowed.
    pub fn for_role(role: &str) -> Option<TaskKind> {
        if role.eq_ignore_ascii_case("approver") {
            Some(TaskKind::Approval)
        } else if role.eq_ignore_ascii_case("executor") {
            Some(TaskKind::Manual)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalResult {
    Approved,
    Rejected,
}

impl ApprovalResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalResult::Approved => "APPROVED",
            ApprovalResult::Rejected => "REJECTED",
        }
    }

    pub fn from_value(value: Option<&Value>) -> Option<ApprovalResult> {
        match value?.as_str()? {
            "APPROVED" => Some(ApprovalResult::Approved),
            "REJECTED" => Some(ApprovalResult::Rejected),
            _ => None,
        }
    }
}

/// Typed view over the fixed variables of a case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessVariables {
    pub initiator: Option<String>,
    pub approver_id: Option<String>,
    pub executor_id: Option<String>,
    pub process_status: Option<ProcessState>,
    pub approval_result: Option<ApprovalResult>,
    pub last_comment: Option<String>,
    pub last_operator: Option<String>,
    pub payload: serde_json::Map<String, Value>,
}

impl ProcessVariables {
    pub fn decode(vars: &VariableMap) -> Self {
        let text = |name: &str| vars.get(name).and_then(Value::as_str).map(str::to_string);
        ProcessVariables {
            initiator: text(INITIATOR),
            approver_id: text(APPROVER_ID),
            executor_id: text(EXECUTOR_ID),
            process_status: ProcessState::from_value(vars.get(PROCESS_STATUS)),
            approval_result: ApprovalResult::from_value(vars.get(APPROVAL_RESULT)),
            last_comment: text(LAST_COMMENT),
            last_operator: text(LAST_OPERATOR),
            payload: payload_of(vars.get(PAYLOAD)),
        }
    }
}

/// The payload mapping of a case; empty when absent or not a mapping.
pub fn payload_of(value: Option<&Value>) -> serde_json::Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

/// Variables a new case starts with.
///
/// Status is forced to `APPROVAL_PENDING`, the decision fields start null,
/// the initiator is the first operator, and the payload is only written
/// when it has entries.
pub fn initial_variables(
    initiator: &str,
    approver_id: &str,
    executor_id: &str,
    payload: &serde_json::Map<String, Value>,
) -> VariableMap {
    let mut vars = VariableMap::new();
    vars.insert(INITIATOR.into(), Value::from(initiator));
    vars.insert(APPROVER_ID.into(), Value::from(approver_id));
    vars.insert(EXECUTOR_ID.into(), Value::from(executor_id));
    vars.insert(
        PROCESS_STATUS.into(),
        Value::from(ProcessState::ApprovalPending.as_str()),
    );
    vars.insert(APPROVAL_RESULT.into(), Value::Null);
    vars.insert(LAST_COMMENT.into(), Value::Null);
    vars.insert(LAST_OPERATOR.into(), Value::from(initiator));
    if !payload.is_empty() {
        vars.insert(PAYLOAD.into(), Value::Object(payload.clone()));
    }
    vars
}

/// The variables one action writes when it completes a task.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDelta {
    pub approval_result: Option<ApprovalResult>,
    pub process_status: ProcessState,
    pub last_comment: Option<String>,
    pub last_operator: String,
}

impl VariableDelta {
    pub fn approve(operator: &str, comment: Option<&str>) -> Self {
        VariableDelta {
            approval_result: Some(ApprovalResult::Approved),
            process_status: ProcessState::ManualPending,
            last_comment: comment.map(str::to_string),
            last_operator: operator.to_string(),
        }
    }

    /// The reason, when given, is recorded as the last comment.
    pub fn reject(operator: &str, reason: Option<&str>, comment: Option<&str>) -> Self {
        VariableDelta {
            approval_result: Some(ApprovalResult::Rejected),
            process_status: ProcessState::Rejected,
            last_comment: reason.or(comment).map(str::to_string),
            last_operator: operator.to_string(),
        }
    }

    pub fn complete(operator: &str, comment: Option<&str>) -> Self {
        VariableDelta {
            approval_result: None,
            process_status: ProcessState::Completed,
            last_comment: comment.map(str::to_string),
            last_operator: operator.to_string(),
        }
    }

    pub fn into_variables(self) -> VariableMap {
        let mut vars = VariableMap::new();
        if let Some(result) = self.approval_result {
            vars.insert(APPROVAL_RESULT.into(), Value::from(result.as_str()));
        }
        vars.insert(
            PROCESS_STATUS.into(),
            Value::from(self.process_status.as_str()),
        );
        vars.insert(
            LAST_COMMENT.into(),
            self.last_comment.map(Value::from).unwrap_or(Value::Null),
        );
        vars.insert(LAST_OPERATOR.into(), Value::from(self.last_operator));
        vars
    }
}
