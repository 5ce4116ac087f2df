//! Execution-engine contract for two-step approval workflows.
//!
//! The orchestration core never talks to a process engine directly; it goes
//! through [`ExecutionEngine`]. This crate holds that trait, the records it
//! returns, [`EngineError`], a reference [`InMemoryEngine`], and a
//! [`conformance`] suite any engine implementation can run.

pub mod conformance;
pub mod definition;
mod error;
pub mod memory;
mod record;
mod traits;

pub use definition::{ProcessDefinition, APPROVAL_PROCESS_KEY, APPROVAL_TASK, MANUAL_TASK};
pub use error::EngineError;
pub use memory::{Clock, InMemoryEngine, SteppingClock, SystemClock, USER_TASK};
pub use record::{
    CommentRecord, HistoricActivityRecord, HistoricVariableRecord, TaskQuery, TaskRecord,
    VariableMap,
};
pub use traits::{EngineListener, ExecutionEngine};
