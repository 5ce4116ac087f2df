//! Application state.

use approvals_core::Workflow;

/// Application state shared across request handlers.
pub(crate) struct AppState {
    /// The core services over the server's engine.
    pub(crate) workflow: Workflow,
}
