//! Audit Recorder.
//!
//! One [`AuditEvent`] per state-changing operation, handed to an
//! [`AuditSink`]. The default sink writes a structured `tracing` event on
//! the `workflow_audit` target. [`AuditListener`] plugs the same sink into
//! the engine so engine-side lifecycle events land in the same trail.

use std::sync::{Arc, Mutex};

use approvals_engine::{EngineListener, TaskRecord};
use time::OffsetDateTime;

/// `tracing` target every audit record is written to.
pub const AUDIT_TARGET: &str = "workflow_audit";

pub const PROCESS_START: &str = "PROCESS_START";
pub const TASK_APPROVED: &str = "TASK_APPROVED";
pub const TASK_REJECTED: &str = "TASK_REJECTED";
pub const TASK_COMPLETED: &str = "TASK_COMPLETED";

/// Engine lifecycle events, distinct from the operation tags above.
pub const PROCESS_STARTED: &str = "PROCESS_STARTED";
pub const PROCESS_ENDED: &str = "PROCESS_ENDED";
pub const TASK_CREATED: &str = "TASK_CREATED";
/// Any user task leaving the engine, whichever action ended it.
pub const TASK_ENDED: &str = "TASK_ENDED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_type: String,
    pub case_id: String,
    pub task_id: Option<String>,
    pub operator: Option<String>,
    pub result: Option<String>,
    pub timestamp: OffsetDateTime,
}

impl AuditEvent {
    pub fn operation(
        event_type: &str,
        case_id: &str,
        task_id: Option<&str>,
        operator: &str,
        result: &str,
    ) -> Self {
        AuditEvent {
            event_type: event_type.to_string(),
            case_id: case_id.to_string(),
            task_id: task_id.map(str::to_string),
            operator: Some(operator.to_string()),
            result: Some(result.to_string()),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    fn lifecycle(event_type: &str, case_id: &str) -> Self {
        AuditEvent {
            event_type: event_type.to_string(),
            case_id: case_id.to_string(),
            task_id: None,
            operator: None,
            result: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Destination of audit records. Recording never fails the operation.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes each record as one `info` event on [`AUDIT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let timestamp = crate::model::timestamp(event.timestamp).unwrap_or_default();
        tracing::info!(
            target: AUDIT_TARGET,
            event_type = %event.event_type,
            case_id = %event.case_id,
            task_id = event.task_id.as_deref(),
            operator = event.operator.as_deref(),
            result = event.result.as_deref(),
            timestamp = %timestamp,
            "{}",
            event.event_type
        );
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Records engine lifecycle notifications on an [`AuditSink`].
pub struct AuditListener {
    sink: Arc<dyn AuditSink>,
}

impl AuditListener {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        AuditListener { sink }
    }

    fn task_event(&self, event_type: &str, task: &TaskRecord) {
        let mut event = AuditEvent::lifecycle(event_type, &task.case_id);
        event.task_id = Some(task.id.clone());
        event.operator = task.assignee.clone();
        event.result = Some(task.definition_key.clone());
        self.sink.record(event);
    }
}

impl EngineListener for AuditListener {
    fn process_started(&self, case_id: &str, definition_key: &str) {
        let mut event = AuditEvent::lifecycle(PROCESS_STARTED, case_id);
        event.result = Some(definition_key.to_string());
        self.sink.record(event);
    }

    fn process_ended(&self, case_id: &str, end_activity_id: &str) {
        let mut event = AuditEvent::lifecycle(PROCESS_ENDED, case_id);
        event.result = Some(end_activity_id.to_string());
        self.sink.record(event);
    }

    fn task_created(&self, task: &TaskRecord) {
        self.task_event(TASK_CREATED, task);
    }

    fn task_completed(&self, task: &TaskRecord) {
        self.task_event(TASK_ENDED, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::operation(
            PROCESS_START,
            "case-1",
            None,
            "i",
            "APPROVAL_PENDING",
        ));
        sink.record(AuditEvent::operation(
            TASK_APPROVED,
            "case-1",
            Some("task-2"),
            "a",
            "APPROVED",
        ));
        assert_eq!(sink.event_types(), vec![PROCESS_START, TASK_APPROVED]);
        let events = sink.events();
        assert_eq!(events[0].task_id, None);
        assert_eq!(events[1].operator.as_deref(), Some("a"));
    }

    #[test]
    fn tracing_sink_accepts_events_without_subscriber() {
        TracingAuditSink.record(AuditEvent::operation(
            TASK_COMPLETED,
            "case-1",
            Some("task-3"),
            "executor-1",
            "COMPLETED",
        ));
    }

    #[test]
    fn listener_records_task_lifecycle() {
        let sink = Arc::new(MemoryAuditSink::new());
        let listener = AuditListener::new(sink.clone());
        let task = TaskRecord {
            id: "task-2".into(),
            name: "Approve request".into(),
            case_id: "case-1".into(),
            definition_key: "approvalTask".into(),
            assignee: Some("approver-1".into()),
            created_at: OffsetDateTime::UNIX_EPOCH,
            sequence: 2,
        };
        listener.process_started("case-1", "approvalProcess");
        listener.task_created(&task);
        listener.task_completed(&task);
        listener.process_ended("case-1", "end");
        assert_eq!(
            sink.event_types(),
            vec![PROCESS_STARTED, TASK_CREATED, TASK_ENDED, PROCESS_ENDED]
        );
        assert_eq!(sink.events()[1].operator.as_deref(), Some("approver-1"));
    }
}
