//! Shared records for agent runs: decided actions, execution outcomes,
//! and the append-only run history.

use serde::{Deserialize, Serialize};

/// One action decided by the reasoning backend.
///
/// Immutable once executed; the parameter map is whatever the backend
/// returned (coordinates may be overwritten by grounding before dispatch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Action name as advertised in the catalogue (serialized as "action")
    #[serde(rename = "action")]
    pub name: String,

    /// Action-specific parameter mapping
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    /// Why the backend chose this action
    #[serde(default)]
    pub reasoning: String,
}

impl ActionRecord {
    /// Create a record with no parameters
    pub fn new(name: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Map::new(),
            reasoning: reasoning.into(),
        }
    }

    /// Compact `name({params})` form used in history transcripts
    pub fn describe(&self) -> String {
        format!(
            "{}({})",
            self.name,
            serde_json::Value::Object(self.params.clone())
        )
    }
}

/// Status of one executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The action executed without error
    Success,
    /// The action could not be executed (the error field says why)
    Failed,
    /// The goal was reported complete; always the last entry of a run
    Complete,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Result of executing one step.
///
/// Serializes flat as `{action, params, reasoning, status, result|error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(flatten)]
    pub action: ActionRecord,

    pub status: StepStatus,

    /// Structured result from the catalogue, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message for failed steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(action: ActionRecord, result: serde_json::Value) -> Self {
        Self {
            action,
            status: StepStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(action: ActionRecord, error: impl Into<String>) -> Self {
        Self {
            action,
            status: StepStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn complete(action: ActionRecord) -> Self {
        Self {
            action,
            status: StepStatus::Complete,
            result: None,
            error: None,
        }
    }
}

/// Append-only record of all executed steps in one run.
///
/// Entries are never mutated or removed; the full transcript is replayed
/// into every subsequent decision request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    entries: Vec<ExecutionOutcome>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: ExecutionOutcome) {
        self.entries.push(outcome);
    }

    pub fn entries(&self) -> &[ExecutionOutcome] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ExecutionOutcome> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the run ended with the completion signal
    pub fn completed(&self) -> bool {
        matches!(self.last(), Some(e) if e.status == StepStatus::Complete)
    }

    /// Number of successfully executed steps
    pub fn success_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == StepStatus::Success)
            .count()
    }

    /// Render the history as prompt context for the next decision.
    ///
    /// Mirrors what the backend saw on every previous call: the most recent
    /// action first, then the full numbered list once there is more than one.
    pub fn transcript(&self) -> String {
        let Some(last) = self.entries.last() else {
            return "No actions taken yet. This is the first action.".to_string();
        };

        let mut out = format!("Last action: {} - {}", last.action.describe(), last.status);

        if self.entries.len() > 1 {
            out.push_str("\n\nAll previous actions:\n");
            for (i, entry) in self.entries.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {} - {}\n",
                    i + 1,
                    entry.action.describe(),
                    entry.status
                ));
            }
        }

        out
    }

    /// Serialize the full history as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_record(x: i64, y: i64) -> ActionRecord {
        let mut record = ActionRecord::new("click", "the button");
        record.params.insert("x".to_string(), x.into());
        record.params.insert("y".to_string(), y.into());
        record
    }

    #[test]
    fn test_action_record_parses_backend_json() {
        let record: ActionRecord = serde_json::from_str(
            r#"{"action": "click", "params": {"x": 500, "y": 500}, "reasoning": "the settings gear icon"}"#,
        )
        .unwrap();
        assert_eq!(record.name, "click");
        assert_eq!(record.params["x"], 500);
        assert_eq!(record.reasoning, "the settings gear icon");
    }

    #[test]
    fn test_action_record_missing_fields_default() {
        let record: ActionRecord = serde_json::from_str(r#"{"action": "done"}"#).unwrap();
        assert!(record.params.is_empty());
        assert!(record.reasoning.is_empty());
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = ExecutionOutcome::success(click_record(10, 20), serde_json::json!({"ok": true}));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["action"], "click");
        assert_eq!(value["params"]["x"], 10);
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["ok"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_transcript_empty() {
        let history = History::new();
        assert!(history.transcript().contains("No actions taken yet"));
    }

    #[test]
    fn test_transcript_single_entry() {
        let mut history = History::new();
        history.push(ExecutionOutcome::success(
            click_record(10, 20),
            serde_json::json!({}),
        ));
        let transcript = history.transcript();
        assert!(transcript.starts_with("Last action: click"));
        assert!(!transcript.contains("All previous actions"));
    }

    #[test]
    fn test_transcript_numbers_all_entries() {
        let mut history = History::new();
        history.push(ExecutionOutcome::success(
            click_record(10, 20),
            serde_json::json!({}),
        ));
        history.push(ExecutionOutcome::failed(
            ActionRecord::new("press_key", "confirm"),
            "no such key",
        ));
        let transcript = history.transcript();
        assert!(transcript.contains("1. click"));
        assert!(transcript.contains("2. press_key"));
        assert!(transcript.contains("failed"));
    }

    #[test]
    fn test_completed_only_for_complete_status() {
        let mut history = History::new();
        history.push(ExecutionOutcome::failed(
            ActionRecord::new("wait", ""),
            "nope",
        ));
        assert!(!history.completed());
        history.push(ExecutionOutcome::complete(ActionRecord::new("done", "finished")));
        assert!(history.completed());
    }
}
