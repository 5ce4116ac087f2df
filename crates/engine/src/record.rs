use std::collections::BTreeMap;

use time::OffsetDateTime;

/// A case's variable set. Values are opaque to the engine.
pub type VariableMap = BTreeMap<String, serde_json::Value>;

/// An active (not yet completed) user task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub case_id: String,
    /// Step id within the process definition, e.g. `approvalTask`.
    pub definition_key: String,
    /// Fixed at creation; the engine never reassigns.
    pub assignee: Option<String>,
    pub created_at: OffsetDateTime,
    /// Creation order within the engine, used to break timestamp ties.
    pub sequence: u64,
}

/// One executed (or executing) activity from the history store.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricActivityRecord {
    pub activity_id: String,
    pub activity_name: Option<String>,
    /// `startEvent`, `userTask`, `exclusiveGateway`, `noneEndEvent`.
    pub activity_type: String,
    pub assignee: Option<String>,
    pub case_id: String,
    pub start_time: OffsetDateTime,
    /// None while the activity is still running.
    pub end_time: Option<OffsetDateTime>,
}

/// One historic write of a case variable.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricVariableRecord {
    pub case_id: String,
    pub name: String,
    pub value: serde_json::Value,
    /// Engine-wide write counter; higher means written later.
    pub revision: u64,
}

/// A human comment attached to a task of a case.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub case_id: String,
    pub task_id: String,
    pub author: String,
    pub message: String,
    pub time: OffsetDateTime,
}

/// Filter for active tasks. Present fields are AND-ed; an empty query
/// matches every active task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub assignee: Option<String>,
    pub definition_key: Option<String>,
    pub case_id: Option<String>,
}

impl TaskQuery {
    pub fn assigned_to(assignee: impl Into<String>) -> Self {
        TaskQuery {
            assignee: Some(assignee.into()),
            ..TaskQuery::default()
        }
    }

    pub fn with_definition_key(mut self, key: impl Into<String>) -> Self {
        self.definition_key = Some(key.into());
        self
    }

    pub fn for_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    /// Whether `task` satisfies every present filter.
    pub fn matches(&self, task: &TaskRecord) -> bool {
        if let Some(assignee) = &self.assignee {
            if task.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(key) = &self.definition_key {
            if &task.definition_key != key {
                return false;
            }
        }
        if let Some(case_id) = &self.case_id {
            if &task.case_id != case_id {
                return false;
            }
        }
        true
    }
}
