use approvals_engine::EngineError;

/// Broad classification of a [`WorkflowError`], for transports that need
/// to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

/// Which half of the acting identity could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPart {
    User,
    Role,
}

impl IdentityPart {
    fn message(self) -> &'static str {
        match self {
            IdentityPart::User => {
                "Missing user identity. Provide X-User-Id header or include userId in the payload."
            }
            IdentityPart::Role => {
                "Missing user role. Provide X-User-Roles header or specify the role explicitly."
            }
        }
    }
}

/// Errors surfaced by the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{}", .0.message())]
    MissingIdentity(IdentityPart),

    #[error("Field '{field}' cannot be blank")]
    InvalidParticipant { field: &'static str },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("User {user_id} is not assigned to task {task_id}")]
    NotAssigned { task_id: String, user_id: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::MissingIdentity(_) | WorkflowError::InvalidParticipant { .. } => {
                ErrorKind::BadRequest
            }
            WorkflowError::NotAssigned { .. } => ErrorKind::Forbidden,
            WorkflowError::TaskNotFound { .. } => ErrorKind::NotFound,
            // The task vanished between lookup and completion.
            WorkflowError::Engine(EngineError::TaskNotFound { .. })
            | WorkflowError::Engine(EngineError::ConcurrentModification { .. }) => {
                ErrorKind::Conflict
            }
            WorkflowError::Engine(EngineError::DefinitionNotFound { .. }) => ErrorKind::Internal,
            WorkflowError::Engine(EngineError::CaseNotFound { .. }) => ErrorKind::NotFound,
            WorkflowError::Engine(_) => ErrorKind::Internal,
        }
    }
}
