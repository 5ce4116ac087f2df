//! In-memory `ExecutionEngine`.
//!
//! Runs registered [`ProcessDefinition`]s entirely in process memory. All
//! state sits behind one `tokio::sync::Mutex`, so every call, and in
//! particular every `complete_task`, is serialized and applies atomically.
//! Listener notifications are dispatched after the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::definition::{approval_process, ProcessDefinition};
use crate::error::EngineError;
use crate::record::{
    CommentRecord, HistoricActivityRecord, HistoricVariableRecord, TaskQuery, TaskRecord,
    VariableMap,
};
use crate::traits::{EngineListener, ExecutionEngine};

/// Activity type of a user task in the history store.
pub const USER_TASK: &str = "userTask";
const START_EVENT: &str = "startEvent";
const END_EVENT: &str = "noneEndEvent";
const GATEWAY: &str = "exclusiveGateway";

/// Source of timestamps for tasks, history and comments.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Deterministic clock: every reading is `step` later than the previous one.
#[derive(Debug)]
pub struct SteppingClock {
    start: OffsetDateTime,
    step: Duration,
    ticks: AtomicU32,
}

impl SteppingClock {
    pub fn new(start: OffsetDateTime, step: Duration) -> Self {
        SteppingClock {
            start,
            step,
            ticks: AtomicU32::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + self.step * n
    }
}

struct CaseState {
    definition_key: String,
    /// Index of the step whose task is currently active.
    step_index: usize,
    variables: VariableMap,
}

/// Lifecycle events captured under the lock, dispatched after it.
enum Lifecycle {
    ProcessStarted {
        case_id: String,
        definition_key: String,
    },
    ProcessEnded {
        case_id: String,
        end_activity_id: String,
    },
    TaskCreated(TaskRecord),
    TaskCompleted(TaskRecord),
}

#[derive(Default)]
struct EngineState {
    definitions: HashMap<String, ProcessDefinition>,
    /// Active cases only; a case is removed when it ends.
    cases: HashMap<String, CaseState>,
    /// Active tasks only; a task is removed when completed.
    tasks: BTreeMap<String, TaskRecord>,
    activities: Vec<HistoricActivityRecord>,
    historic_variables: Vec<HistoricVariableRecord>,
    comments: Vec<CommentRecord>,
    next_id: u64,
    next_revision: u64,
}

impl EngineState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn write_variables(&mut self, case_id: &str, variables: VariableMap) {
        for (name, value) in variables {
            self.next_revision += 1;
            self.historic_variables.push(HistoricVariableRecord {
                case_id: case_id.to_string(),
                name: name.clone(),
                value: value.clone(),
                revision: self.next_revision,
            });
            if let Some(case) = self.cases.get_mut(case_id) {
                case.variables.insert(name, value);
            }
        }
    }

    fn record_passage(
        &mut self,
        case_id: &str,
        activity_id: &str,
        name: Option<&str>,
        activity_type: &str,
        now: OffsetDateTime,
    ) {
        self.activities.push(HistoricActivityRecord {
            activity_id: activity_id.to_string(),
            activity_name: name.map(str::to_string),
            activity_type: activity_type.to_string(),
            assignee: None,
            case_id: case_id.to_string(),
            start_time: now,
            end_time: Some(now),
        });
    }

    /// Create the task for step `index` of the case's definition.
    fn enter_step(
        &mut self,
        case_id: &str,
        definition: &ProcessDefinition,
        index: usize,
        now: OffsetDateTime,
        events: &mut Vec<Lifecycle>,
    ) -> Result<(), EngineError> {
        let step = definition.step(index).ok_or_else(|| {
            EngineError::Backend(format!(
                "definition '{}' has no step {}",
                definition.key, index
            ))
        })?;
        let case = self
            .cases
            .get_mut(case_id)
            .ok_or_else(|| EngineError::CaseNotFound {
                case_id: case_id.to_string(),
            })?;
        case.step_index = index;
        let assignee = case
            .variables
            .get(&step.assignee_variable)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        self.next_id += 1;
        let sequence = self.next_id;
        let task = TaskRecord {
            id: format!("task-{sequence}"),
            name: step.name.clone(),
            case_id: case_id.to_string(),
            definition_key: step.id.clone(),
            assignee: assignee.clone(),
            created_at: now,
            sequence,
        };
        self.activities.push(HistoricActivityRecord {
            activity_id: step.id.clone(),
            activity_name: Some(step.name.clone()),
            activity_type: USER_TASK.to_string(),
            assignee,
            case_id: case_id.to_string(),
            start_time: now,
            end_time: None,
        });
        self.tasks.insert(task.id.clone(), task.clone());
        events.push(Lifecycle::TaskCreated(task));
        Ok(())
    }

    fn end_case(&mut self, case_id: &str, now: OffsetDateTime, events: &mut Vec<Lifecycle>) {
        self.record_passage(case_id, "end", Some("End"), END_EVENT, now);
        self.cases.remove(case_id);
        events.push(Lifecycle::ProcessEnded {
            case_id: case_id.to_string(),
            end_activity_id: "end".to_string(),
        });
    }

    /// Active, or ended with history.
    fn is_known(&self, case_id: &str) -> bool {
        self.cases.contains_key(case_id) || self.activities.iter().any(|a| a.case_id == case_id)
    }

    fn live_case(&self, case_id: &str) -> Result<&CaseState, EngineError> {
        self.cases
            .get(case_id)
            .ok_or_else(|| EngineError::CaseNotFound {
                case_id: case_id.to_string(),
            })
    }
}

/// An `ExecutionEngine` that keeps everything in memory.
///
/// `InMemoryEngine::new()` comes with the approval process registered.
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn EngineListener>>,
    live_reads: AtomicBool,
}

impl InMemoryEngine {
    /// Engine with the approval process registered and a wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Engine with the approval process registered and the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut state = EngineState::default();
        let def = approval_process();
        state.definitions.insert(def.key.clone(), def);
        InMemoryEngine {
            state: Mutex::new(state),
            clock,
            listeners: Vec::new(),
            live_reads: AtomicBool::new(true),
        }
    }

    /// Add a lifecycle listener. Listeners are called in registration order.
    pub fn with_listener(mut self, listener: Arc<dyn EngineListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register (or replace) a process definition.
    pub async fn register(&self, definition: ProcessDefinition) -> Result<(), EngineError> {
        definition.validate().map_err(EngineError::Backend)?;
        let mut state = self.state.lock().await;
        state.definitions.insert(definition.key.clone(), definition);
        Ok(())
    }

    /// Keys of every registered definition, sorted.
    pub async fn definition_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state.definitions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Toggle the live variable store. While off, `read_variable` and
    /// `read_variables` fail with `EngineError::Unavailable`; tasks and
    /// history stay readable.
    pub fn set_live_reads_available(&self, available: bool) {
        self.live_reads.store(available, Ordering::SeqCst);
    }

    fn check_live_reads(&self) -> Result<(), EngineError> {
        if self.live_reads.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unavailable(
                "live variable store is offline".to_string(),
            ))
        }
    }

    fn dispatch(&self, events: Vec<Lifecycle>) {
        for event in &events {
            for listener in &self.listeners {
                match event {
                    Lifecycle::ProcessStarted {
                        case_id,
                        definition_key,
                    } => listener.process_started(case_id, definition_key),
                    Lifecycle::ProcessEnded {
                        case_id,
                        end_activity_id,
                    } => listener.process_ended(case_id, end_activity_id),
                    Lifecycle::TaskCreated(task) => listener.task_created(task),
                    Lifecycle::TaskCompleted(task) => listener.task_completed(task),
                }
            }
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryEngine {
    async fn create_case(
        &self,
        definition_key: &str,
        variables: VariableMap,
    ) -> Result<String, EngineError> {
        let mut events = Vec::new();
        let case_id = {
            let mut state = self.state.lock().await;
            let definition = state
                .definitions
                .get(definition_key)
                .cloned()
                .ok_or_else(|| EngineError::DefinitionNotFound {
                    key: definition_key.to_string(),
                })?;
            let now = self.clock.now();
            let case_id = state.next_id("case");
            state.cases.insert(
                case_id.clone(),
                CaseState {
                    definition_key: definition.key.clone(),
                    step_index: 0,
                    variables: VariableMap::new(),
                },
            );
            state.record_passage(&case_id, "start", Some("Start"), START_EVENT, now);
            state.write_variables(&case_id, variables);
            events.push(Lifecycle::ProcessStarted {
                case_id: case_id.clone(),
                definition_key: definition.key.clone(),
            });
            state.enter_step(&case_id, &definition, 0, now, &mut events)?;
            case_id
        };
        tracing::debug!(case_id = %case_id, definition_key, "case created");
        self.dispatch(events);
        Ok(case_id)
    }

    async fn is_active(&self, case_id: &str) -> Result<bool, EngineError> {
        let state = self.state.lock().await;
        Ok(state.cases.contains_key(case_id))
    }

    async fn active_task(&self, case_id: &str) -> Result<Option<TaskRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state.tasks.values().find(|t| t.case_id == case_id).cloned())
    }

    async fn task(&self, task_id: &str) -> Result<Option<TaskRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(task_id).cloned())
    }

    async fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn complete_task(
        &self,
        task_id: &str,
        variables: VariableMap,
    ) -> Result<(), EngineError> {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            let task = state
                .tasks
                .get(task_id)
                .cloned()
                .ok_or_else(|| EngineError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;
            let (definition, step_index) = {
                let case = state.live_case(&task.case_id)?;
                let definition = state
                    .definitions
                    .get(&case.definition_key)
                    .cloned()
                    .ok_or_else(|| EngineError::DefinitionNotFound {
                        key: case.definition_key.clone(),
                    })?;
                (definition, case.step_index)
            };
            let step = definition.step(step_index).cloned().ok_or_else(|| {
                EngineError::Backend(format!(
                    "case {} points past the end of '{}'",
                    task.case_id, definition.key
                ))
            })?;
            if step.id != task.definition_key {
                return Err(EngineError::ConcurrentModification {
                    task_id: task_id.to_string(),
                });
            }

            // Nothing below can fail, so the completion applies as one unit.
            let now = self.clock.now();
            state.tasks.remove(task_id);
            state.write_variables(&task.case_id, variables);
            if let Some(activity) = state.activities.iter_mut().rev().find(|a| {
                a.case_id == task.case_id
                    && a.activity_id == task.definition_key
                    && a.end_time.is_none()
            }) {
                activity.end_time = Some(now);
            }
            events.push(Lifecycle::TaskCompleted(task.clone()));

            let proceed = match &step.gate {
                Some(gate) => {
                    state.record_passage(
                        &task.case_id,
                        &gate.id,
                        Some(gate.name.as_str()),
                        GATEWAY,
                        now,
                    );
                    state
                        .cases
                        .get(&task.case_id)
                        .map(|c| gate.holds(&c.variables))
                        .unwrap_or(false)
                }
                None => true,
            };
            let next = step_index + 1;
            if proceed && next < definition.steps.len() {
                state.enter_step(&task.case_id, &definition, next, now, &mut events)?;
            } else {
                state.end_case(&task.case_id, now, &mut events);
            }
        }
        self.dispatch(events);
        Ok(())
    }

    async fn add_comment(
        &self,
        case_id: &str,
        task_id: &str,
        author: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if !state.is_known(case_id) {
            return Err(EngineError::CaseNotFound {
                case_id: case_id.to_string(),
            });
        }
        let id = state.next_id("comment");
        let time = self.clock.now();
        state.comments.push(CommentRecord {
            id,
            case_id: case_id.to_string(),
            task_id: task_id.to_string(),
            author: author.to_string(),
            message: message.to_string(),
            time,
        });
        Ok(())
    }

    async fn comments(&self, case_id: &str) -> Result<Vec<CommentRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn read_variable(
        &self,
        case_id: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        self.check_live_reads()?;
        let state = self.state.lock().await;
        Ok(state.live_case(case_id)?.variables.get(name).cloned())
    }

    async fn read_variables(&self, case_id: &str) -> Result<VariableMap, EngineError> {
        self.check_live_reads()?;
        let state = self.state.lock().await;
        Ok(state.live_case(case_id)?.variables.clone())
    }

    async fn read_historic_variable(
        &self,
        case_id: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .historic_variables
            .iter()
            .filter(|v| v.case_id == case_id && v.name == name)
            .max_by_key(|v| v.revision)
            .map(|v| v.value.clone()))
    }

    async fn read_historic_variables(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricVariableRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .historic_variables
            .iter()
            .filter(|v| v.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn read_historic_activities(
        &self,
        case_id: &str,
    ) -> Result<Vec<HistoricActivityRecord>, EngineError> {
        let state = self.state.lock().await;
        let mut activities: Vec<HistoricActivityRecord> = state
            .activities
            .iter()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect();
        // Stable: equal start times keep insertion order.
        activities.sort_by_key(|a| a.start_time);
        Ok(activities)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
