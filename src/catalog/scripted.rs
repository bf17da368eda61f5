//! In-memory catalogue executor for tests and dry runs.

use super::types::{ActionError, ActionExecutor, ActionKind, ActionResult, Params, validate_params};

/// Records every invocation instead of touching the desktop.
///
/// Pointer state tracks `move_mouse`/`click` coordinates so grounding
/// refinement behaves the same way it does against a real pointer.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    /// Every invocation in dispatch order
    pub invoked: Vec<(ActionKind, Params)>,
    /// Simulated pointer position
    pub pointer: (i32, i32),
    /// Actions that should fail with a tool error when invoked
    pub fail_on: Vec<ActionKind>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given action fail with a scripted tool error
    pub fn fail_on(mut self, kind: ActionKind) -> Self {
        self.fail_on.push(kind);
        self
    }

    /// Invocations of one action kind
    pub fn invocations_of(&self, kind: ActionKind) -> Vec<&Params> {
        self.invoked
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p)
            .collect()
    }
}

impl ActionExecutor for ScriptedExecutor {
    fn invoke(&mut self, kind: ActionKind, params: &Params) -> ActionResult<serde_json::Value> {
        validate_params(kind, params)?;
        self.invoked.push((kind, params.clone()));

        if self.fail_on.contains(&kind) {
            return Err(ActionError::Tool(format!("scripted failure for {}", kind)));
        }

        if matches!(kind, ActionKind::MoveMouse | ActionKind::Click) {
            if let (Some(x), Some(y)) = (
                params.get("x").and_then(|v| v.as_i64()),
                params.get("y").and_then(|v| v.as_i64()),
            ) {
                self.pointer = (x as i32, y as i32);
            }
        }

        Ok(serde_json::json!({"action": kind.name()}))
    }

    fn pointer_position(&mut self) -> ActionResult<(i32, i32)> {
        Ok(self.pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_invocations_and_pointer() {
        let mut exec = ScriptedExecutor::new();
        exec.move_pointer(40, 60).unwrap();
        assert_eq!(exec.pointer_position().unwrap(), (40, 60));
        assert_eq!(exec.invocations_of(ActionKind::MoveMouse).len(), 1);
    }

    #[test]
    fn test_scripted_failure() {
        let mut exec = ScriptedExecutor::new().fail_on(ActionKind::Paste);
        let err = exec.invoke(ActionKind::Paste, &Params::new()).unwrap_err();
        assert!(matches!(err, ActionError::Tool(_)));
        // Failed invocations are still recorded
        assert_eq!(exec.invocations_of(ActionKind::Paste).len(), 1);
    }

    #[test]
    fn test_rejects_undeclared_params() {
        let mut exec = ScriptedExecutor::new();
        let mut params = Params::new();
        params.insert("bogus".to_string(), 1.into());
        let err = exec.invoke(ActionKind::Wait, &params).unwrap_err();
        assert!(matches!(err, ActionError::UnknownParam { .. }));
    }
}
