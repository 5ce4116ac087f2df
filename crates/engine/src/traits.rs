use async_trait::async_trait;

use crate::error::EngineError;
use crate::record::{
    CommentRecord, HistoricActivityRecord, HistoricVariableRecord, TaskQuery, TaskRecord,
    VariableMap,
};

/// The contract the orchestration core consumes from a process-execution
/// engine.
///
/// The engine owns every case, task, history entry and variable. Callers
/// only read, and request mutations through [`ExecutionEngine::complete_task`]
/// and [`ExecutionEngine::add_comment`]; nothing is cached between calls.
///
/// ## Live vs. historic reads
///
/// `read_variable` / `read_variables` only see active cases. Once a case
/// terminates they fail with `EngineError::CaseNotFound`, and its final
/// values are only reachable through the `read_historic_*` methods.
///
/// ## Atomicity
///
/// `complete_task` is the sole commit point. It must apply the variable
/// delta and advance the case (create the next task or terminate) as one
/// unit, and must reject a second completion of the same task, either with
/// `TaskNotFound` or `ConcurrentModification`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    // ── Cases ────────────────────────────────────────────────────────────────

    /// Start a new case of the given definition with its initial variables.
    /// Returns the engine-assigned case id.
    async fn create_case(
        &self,
        definition_key: &str,
        variables: VariableMap,
    ) -> Result<String, EngineError>;

    /// Whether the case exists and has not terminated.
    async fn is_active(&self, case_id: &str) -> Result<bool, EngineError>;

    // ── Tasks ────────────────────────────────────────────────────────────────

    /// The single active task of a case, if any.
    async fn active_task(&self, case_id: &str) -> Result<Option<TaskRecord>, EngineError>;

    /// An active task by id, if it exists.
    async fn task(&self, task_id: &str) -> Result<Option<TaskRecord>, EngineError>;

    /// Active tasks matching the query, in no guaranteed order.
    async fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, EngineError>;

    /// Complete a task, writing `variables` into its case, and advance the case.
    async fn complete_task(&self, task_id: &str, variables: VariableMap)
        -> Result<(), EngineError>;

    /// Attach a human comment to a task of a case. The case may already
    /// have ended; unknown cases fail with `CaseNotFound`.
    async fn add_comment(
        &self,
        case_id: &str,
        task_id: &str,
        author: &str,
        message: &str,
    ) -> Result<(), EngineError>;

    /// Every comment of a case, oldest first.
    async fn comments(&self, case_id: &str) -> Result<Vec<CommentRecord>, EngineError>;

    // ── Live variables ───────────────────────────────────────────────────────

    /// One live variable of an active case. `Ok(None)` if unset.
    async fn read_variable(
        &self,
        case_id: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, EngineError>;

    /// The full live variable set of an active case.
    async fn read_variables(&self, case_id: &str) -> Result<VariableMap, EngineError>;

    // ── History ──────────────────────────────────────────────────────────────

    /// The last recorded value of a variable, whether or not the case is active.
    async fn read_historic_variable(
        &self,
        case_id: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, EngineError>;

    /// Every recorded variable write of a case, in write order.
    async fn read_historic_variables(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricVariableRecord>, EngineError>;

    /// Every activity instance of a case, ordered by start time ascending.
    async fn read_historic_activities(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricActivityRecord>, EngineError>;
}

/// Engine-side lifecycle notifications.
///
/// Called synchronously from inside the engine after the corresponding
/// change is committed. Implementations must not call back into the engine.
pub trait EngineListener: Send + Sync {
    fn process_started(&self, _case_id: &str, _definition_key: &str) {}

    fn process_ended(&self, _case_id: &str, _end_activity_id: &str) {}

    fn task_created(&self, _task: &TaskRecord) {}

    fn task_completed(&self, _task: &TaskRecord) {}
}
