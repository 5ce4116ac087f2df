//! Status Resolver.
//!
//! Reconstructs the state, current task, history and variables of a case.
//! Live data is preferred; once a case has terminated (or the live store is
//! offline) the historic store answers instead. The fallback is the
//! explicit [`live_or_historic`] lookup and only triggers on a structural
//! miss, never on arbitrary engine failures.

use std::future::Future;
use std::sync::Arc;

use approvals_engine::{EngineError, ExecutionEngine, VariableMap, USER_TASK};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::model::{HistoryEntry, ProcessStatus, TaskSummary};
use crate::variables::{ProcessState, TaskKind, APPROVAL_RESULT, PROCESS_STATUS};

/// Which tier answered a two-tier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Live,
    Historic,
}

/// Two-tier read: take the live answer when it has a value, consult the
/// historic tier when the live one is empty or reports a live miss
/// ([`EngineError::is_live_miss`]). Other live failures propagate.
pub async fn live_or_historic<T, H, Fut>(
    live: Result<Option<T>, EngineError>,
    historic: H,
) -> Result<(Option<T>, Tier), EngineError>
where
    H: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, EngineError>>,
{
    match live {
        Ok(Some(value)) => return Ok((Some(value), Tier::Live)),
        Ok(None) => {}
        Err(e) if e.is_live_miss() => {
            tracing::debug!(error = %e, "live read missed, using history");
        }
        Err(e) => return Err(e),
    }
    let value = historic().await?;
    Ok((value, Tier::Historic))
}

pub struct StatusResolver {
    engine: Arc<dyn ExecutionEngine>,
}

impl StatusResolver {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        StatusResolver { engine }
    }

    pub async fn status(&self, case_id: &str) -> Result<ProcessStatus, WorkflowError> {
        let state = self.state(case_id).await?;
        let current_task = self
            .engine
            .active_task(case_id)
            .await?
            .as_ref()
            .map(TaskSummary::from);
        let history = self.history(case_id).await?;
        let variables = self.variables(case_id).await?;
        Ok(ProcessStatus {
            case_id: case_id.to_string(),
            state,
            current_task,
            history,
            variables,
        })
    }

    /// Current `processStatus`; `None` when neither tier has a value.
    pub async fn state(&self, case_id: &str) -> Result<Option<ProcessState>, EngineError> {
        let live = self
            .engine
            .read_variable(case_id, PROCESS_STATUS)
            .await
            .map(|v| v.filter(|v| !v.is_null()));
        let (value, _) = live_or_historic(live, || {
            self.engine.read_historic_variable(case_id, PROCESS_STATUS)
        })
        .await?;
        Ok(ProcessState::from_value(value.as_ref()))
    }

    /// Every activity of the case, oldest first, with its resolved result.
    ///
    /// The manual step always reads `COMPLETED`. Any other user task reads
    /// the case's `approvalResult`: one case has one approval decision, so
    /// the lookup is case-wide rather than per activity.
    pub async fn history(&self, case_id: &str) -> Result<Vec<HistoryEntry>, EngineError> {
        let activities = self.engine.read_historic_activities(case_id).await?;
        let is_manual = |id: &str| TaskKind::from_definition_key(id) == Some(TaskKind::Manual);
        let needs_decision = activities
            .iter()
            .any(|a| a.activity_type == USER_TASK && !is_manual(&a.activity_id));
        let decision = if needs_decision {
            self.engine
                .read_historic_variable(case_id, APPROVAL_RESULT)
                .await?
                .and_then(value_label)
        } else {
            None
        };

        Ok(activities
            .iter()
            .map(|activity| {
                let result = if activity.activity_type != USER_TASK {
                    None
                } else if is_manual(&activity.activity_id) {
                    Some(ProcessState::Completed.as_str().to_string())
                } else {
                    decision.clone()
                };
                HistoryEntry::new(activity, result)
            })
            .collect())
    }

    /// The live variables of an active case, else the last historic value
    /// of every variable the case ever wrote.
    pub async fn variables(&self, case_id: &str) -> Result<VariableMap, EngineError> {
        let live = self.engine.read_variables(case_id).await.map(Some);
        let (vars, tier) = live_or_historic(live, || async {
            let mut records = self.engine.read_historic_variables(case_id).await?;
            records.sort_by_key(|r| r.revision);
            let merged: VariableMap = records.into_iter().map(|r| (r.name, r.value)).collect();
            Ok::<_, EngineError>(Some(merged))
        })
        .await?;
        if tier == Tier::Historic {
            tracing::debug!(case_id, "variables resolved from history");
        }
        Ok(vars.unwrap_or_default())
    }
}

/// Render a stored value as a result label.
fn value_label(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
