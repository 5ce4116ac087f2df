/// All errors that can be returned by an `ExecutionEngine` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No active case with this id. Terminated cases are no longer active.
    #[error("case not found: {case_id}")]
    CaseNotFound { case_id: String },

    /// No active task with this id. Completed tasks are no longer active.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// No process definition registered under this key.
    #[error("process definition not found: {key}")]
    DefinitionNotFound { key: String },

    /// Another writer changed the task or case while this call was in flight.
    #[error("concurrent modification of task {task_id}")]
    ConcurrentModification { task_id: String },

    /// The live store could not be reached. History may still be readable.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific failure (connection, serialization, etc.).
    #[error("engine backend error: {0}")]
    Backend(String),
}

impl EngineError {
    /// True when a live read found no live data for structural reasons: the
    /// case has terminated, or the live store is down. These are the only
    /// failures after which a caller may consult history instead.
    pub fn is_live_miss(&self) -> bool {
        matches!(
            self,
            EngineError::CaseNotFound { .. } | EngineError::Unavailable(_)
        )
    }
}
