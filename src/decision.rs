//! Decision engine: one observation in, exactly one action out.
//!
//! A pure request/response mapper around the reasoning backend. Retry
//! policy lives in the agent loop, not here.

use crate::catalog;
use crate::observe::Observation;
use crate::parse::extract_json_object;
use crate::record::{ActionRecord, History};
use crate::vlm::{ModelBackend, VlmError};

/// One decision returned by the reasoning backend
#[derive(Debug, Clone)]
pub enum Decision {
    /// Take this action next
    Act(ActionRecord),
    /// The goal is satisfied; the record carries the closing rationale
    Done(ActionRecord),
}

/// Result type for decision operations
pub type DecisionResult<T> = Result<T, DecisionError>;

/// Errors that can occur while obtaining a decision
#[derive(Debug)]
pub enum DecisionError {
    /// The response contained no parseable action object
    Parse(String),
    /// The backend call itself failed
    Backend(VlmError),
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionError::Parse(msg) => write!(f, "Unparseable decision: {}", msg),
            DecisionError::Backend(e) => write!(f, "Decision backend error: {}", e),
        }
    }
}

impl std::error::Error for DecisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecisionError::Parse(_) => None,
            DecisionError::Backend(e) => Some(e),
        }
    }
}

impl From<VlmError> for DecisionError {
    fn from(e: VlmError) -> Self {
        DecisionError::Backend(e)
    }
}

/// Asks the reasoning backend for the next action.
pub struct DecisionEngine {
    backend: Box<dyn ModelBackend>,
}

impl DecisionEngine {
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Request exactly one next action (or the completion signal) for the
    /// goal, given everything done so far and the current screen.
    pub fn decide(
        &self,
        goal: &str,
        history: &History,
        observation: &Observation,
    ) -> DecisionResult<Decision> {
        let prompt = decision_prompt(goal, history);
        let raw = self.backend.query(&prompt, Some(observation))?;
        parse_decision(&raw)
    }
}

/// Full prompt for one decision request: the action catalogue, output
/// rules, the goal, and the history transcript.
pub fn decision_prompt(goal: &str, history: &History) -> String {
    let catalogue = serde_json::to_string_pretty(&catalog::descriptions())
        .expect("catalogue description serializes");

    format!(
        "You are a computer automation agent that decides ONE action at a time.\n\
        \n\
        AVAILABLE ACTIONS:\n\
        {catalogue}\n\
        \n\
        YOUR JOB:\n\
        1. Look at the current screenshot\n\
        2. Consider the goal and what's been done so far\n\
        3. Decide the NEXT SINGLE ACTION to take\n\
        4. Output ONLY that action in JSON format\n\
        \n\
        OUTPUT FORMAT:\n\
        If you need to take another action:\n\
        {{\n\
        \x20 \"action\": \"action_name\",\n\
        \x20 \"params\": {{\"param1\": \"value1\"}},\n\
        \x20 \"reasoning\": \"why this action\"\n\
        }}\n\
        \n\
        If the goal is complete:\n\
        {{\n\
        \x20 \"action\": \"done\",\n\
        \x20 \"params\": {{}},\n\
        \x20 \"reasoning\": \"goal accomplished\"\n\
        }}\n\
        \n\
        RULES:\n\
        - Output ONLY valid JSON, nothing else\n\
        - ONE action per response\n\
        - For click and move_mouse, describe the target element in your reasoning\n\
        - Use wait() after actions that change the UI (1-3 seconds)\n\
        - Output \"done\" when the goal is accomplished\n\
        \n\
        Goal: {goal}\n\
        \n\
        {transcript}\n\
        \n\
        Based on the current screenshot, what is the NEXT action to take?",
        transcript = history.transcript(),
    )
}

/// Extract and decode the first action object in a raw response
pub fn parse_decision(raw: &str) -> DecisionResult<Decision> {
    let json = extract_json_object(raw).ok_or_else(|| {
        DecisionError::Parse(format!("no JSON object in response: {}", truncate(raw, 200)))
    })?;

    let record: ActionRecord = serde_json::from_str(json)
        .map_err(|e| DecisionError::Parse(format!("{}: {}", e, truncate(json, 200))))?;

    if record.name == "done" {
        Ok(Decision::Done(record))
    } else {
        Ok(Decision::Act(record))
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
