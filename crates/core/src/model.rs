//! Request and response shapes of the core operations.
//!
//! Field names serialize in camelCase. Timestamps are RFC 3339 strings in
//! UTC.

use approvals_engine::{HistoricActivityRecord, TaskRecord, VariableMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::variables::ProcessState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartCaseRequest {
    pub initiator: Option<String>,
    pub approver_id: Option<String>,
    pub executor_id: Option<String>,
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCaseResponse {
    pub case_id: String,
    pub state: ProcessState,
    pub current_task: Option<TaskSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub task_name: String,
    pub case_id: String,
    pub created_at: Option<String>,
}

impl From<&TaskRecord> for TaskSummary {
    fn from(task: &TaskRecord) -> Self {
        TaskSummary {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            case_id: task.case_id.clone(),
            created_at: timestamp(task.created_at),
        }
    }
}

/// A task as listed for its assignee, with the case payload attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListItem {
    pub task_id: String,
    pub task_name: String,
    pub case_id: String,
    pub created_at: Option<String>,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub activity_id: String,
    pub activity_name: Option<String>,
    pub activity_type: String,
    pub assignee: Option<String>,
    pub result: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl HistoryEntry {
    pub fn new(activity: &HistoricActivityRecord, result: Option<String>) -> Self {
        HistoryEntry {
            activity_id: activity.activity_id.clone(),
            activity_name: activity.activity_name.clone(),
            activity_type: activity.activity_type.clone(),
            assignee: activity.assignee.clone(),
            result,
            start_time: timestamp(activity.start_time),
            end_time: activity.end_time.and_then(timestamp),
        }
    }
}

/// Resolved status of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub case_id: String,
    pub state: Option<ProcessState>,
    pub current_task: Option<TaskSummary>,
    pub history: Vec<HistoryEntry>,
    pub variables: VariableMap,
}

/// Body of approve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionRequest {
    pub user_id: Option<String>,
    pub comment: Option<String>,
    /// Only read by reject.
    pub reason: Option<String>,
}

/// Body of complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionRequest {
    pub user_id: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOperationResponse {
    pub task_id: String,
    pub status: String,
    pub next_state: ProcessState,
}

pub(crate) fn timestamp(t: OffsetDateTime) -> Option<String> {
    t.format(&Rfc3339).ok()
}
