//! Sequential process definitions understood by the in-memory engine.
//!
//! A definition is a straight line of user tasks. After a step completes its
//! optional [`Gate`] is checked against the case variables; a gate that does
//! not hold ends the case instead of moving to the next step.

use serde_json::Value;

/// Definition key of the two-step approval process.
pub const APPROVAL_PROCESS_KEY: &str = "approvalProcess";
/// Step id of the approval task.
pub const APPROVAL_TASK: &str = "approvalTask";
/// Step id of the manual execution task.
pub const MANUAL_TASK: &str = "manualTask";

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinition {
    pub key: String,
    pub name: String,
    pub steps: Vec<UserTaskStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTaskStep {
    pub id: String,
    pub name: String,
    /// Case variable whose string value names the task's assignee.
    pub assignee_variable: String,
    pub gate: Option<Gate>,
}

/// Continue past a step only while `variable == equals`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub id: String,
    pub name: String,
    pub variable: String,
    pub equals: Value,
}

impl Gate {
    pub fn holds(&self, variables: &crate::VariableMap) -> bool {
        variables.get(&self.variable) == Some(&self.equals)
    }
}

impl ProcessDefinition {
    /// Reject definitions the engine cannot run: no steps, or duplicate step ids.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("process definition key is empty".to_string());
        }
        if self.steps.is_empty() {
            return Err(format!("process definition '{}' has no steps", self.key));
        }
        let mut seen = std::collections::BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(format!(
                    "process definition '{}' repeats step id '{}'",
                    self.key, step.id
                ));
            }
        }
        Ok(())
    }

    pub fn step(&self, index: usize) -> Option<&UserTaskStep> {
        self.steps.get(index)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }
}

/// The approval process: the approver decides, and only an approved case
/// reaches the executor's manual step.
pub fn approval_process() -> ProcessDefinition {
    ProcessDefinition {
        key: APPROVAL_PROCESS_KEY.to_string(),
        name: "Approval and manual execution".to_string(),
        steps: vec![
            UserTaskStep {
                id: APPROVAL_TASK.to_string(),
                name: "Approve request".to_string(),
                assignee_variable: "approverId".to_string(),
                gate: Some(Gate {
                    id: "approvalGateway".to_string(),
                    name: "Approved?".to_string(),
                    variable: "approvalResult".to_string(),
                    equals: Value::String("APPROVED".to_string()),
                }),
            },
            UserTaskStep {
                id: MANUAL_TASK.to_string(),
                name: "Perform manual step".to_string(),
                assignee_variable: "executorId".to_string(),
                gate: None,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_process_is_valid() {
        let def = approval_process();
        assert!(def.validate().is_ok());
        assert_eq!(def.step_index(MANUAL_TASK), Some(1));
    }

    #[test]
    fn duplicate_step_ids_rejected() {
        let mut def = approval_process();
        def.steps[1].id = APPROVAL_TASK.to_string();
        let err = def.validate().unwrap_err();
        assert!(err.contains("repeats step id"), "{err}");
    }

    #[test]
    fn empty_definition_rejected() {
        let def = ProcessDefinition {
            key: "empty".into(),
            name: "Empty".into(),
            steps: vec![],
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn gate_compares_exact_value() {
        let def = approval_process();
        let gate = def.steps[0].gate.clone().unwrap();
        let mut vars = crate::VariableMap::new();
        assert!(!gate.holds(&vars));
        vars.insert("approvalResult".into(), Value::String("REJECTED".into()));
        assert!(!gate.holds(&vars));
        vars.insert("approvalResult".into(), Value::String("APPROVED".into()));
        assert!(gate.holds(&vars));
    }
}
