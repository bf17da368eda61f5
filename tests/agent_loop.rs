//! End-to-end agent loop scenarios against scripted backends and the mock
//! screen. No desktop, no network.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use screen_pilot::agent::{Agent, AgentConfig};
use screen_pilot::catalog::{ActionKind, ScriptedExecutor};
use screen_pilot::decision::DecisionEngine;
use screen_pilot::observe::{MockScreen, Observation};
use screen_pilot::record::StepStatus;
use screen_pilot::resolver::{Resolver, ResolverConfig};
use screen_pilot::vlm::{ModelBackend, VlmResult};

/// Replays canned responses in order; answers "done" once the script runs
/// out so a runaway loop ends instead of hanging a test
struct ScriptedBackend {
    responses: RefCell<VecDeque<String>>,
}

impl ScriptedBackend {
    fn new(responses: &[&str]) -> Box<Self> {
        Box::new(Self {
            responses: RefCell::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

impl ModelBackend for ScriptedBackend {
    fn query(&self, _prompt: &str, _observation: Option<&Observation>) -> VlmResult<String> {
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_else(|| {
            r#"{"action": "done", "params": {}, "reasoning": "script exhausted"}"#.to_string()
        }))
    }
}

/// Scripted backend that also keeps every prompt it was asked, so tests
/// can check what a grounding query actually said
struct CaptureBackend {
    responses: RefCell<VecDeque<String>>,
    prompts: Rc<RefCell<Vec<String>>>,
}

impl CaptureBackend {
    fn new(responses: &[&str], prompts: &Rc<RefCell<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            responses: RefCell::new(responses.iter().map(|s| s.to_string()).collect()),
            prompts: Rc::clone(prompts),
        })
    }
}

impl ModelBackend for CaptureBackend {
    fn query(&self, prompt: &str, _observation: Option<&Observation>) -> VlmResult<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| r#"{"on_target": true}"#.to_string()))
    }
}

fn fast_config(max_steps: usize) -> AgentConfig {
    AgentConfig::default()
        .max_steps(max_steps)
        .retry_backoff(Duration::ZERO)
}

fn test_resolver(responses: &[&str]) -> Resolver {
    Resolver::new(
        ScriptedBackend::new(responses),
        ResolverConfig::default()
            .max_attempts(4)
            .min_movement_px(10.0)
            .settle(Duration::ZERO),
    )
}

#[test]
fn done_signal_yields_single_complete_entry() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "done", "params": {}, "reasoning": "the settings page is already open"}"#,
    ]));
    let mut agent = Agent::new(
        decision,
        Box::new(MockScreen::new(800, 600)),
        Box::new(ScriptedExecutor::new()),
        fast_config(10),
    );

    let history = agent.run("open settings").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history.entries()[0].status, StepStatus::Complete);
    assert!(history.completed());
}

#[test]
fn budget_exhaustion_stops_at_max_steps() {
    let script: Vec<String> = (0..20)
        .map(|_| r#"{"action": "wait", "params": {"seconds": 0.0}, "reasoning": "still loading"}"#.to_string())
        .collect();
    let refs: Vec<&str> = script.iter().map(|s| s.as_str()).collect();

    let decision = DecisionEngine::new(ScriptedBackend::new(&refs));
    let mut agent = Agent::new(
        decision,
        Box::new(MockScreen::new(800, 600)),
        Box::new(ScriptedExecutor::new()),
        fast_config(3),
    );

    let history = agent.run("wait for the page").unwrap();
    assert_eq!(history.len(), 3);
    assert!(!history.completed());
}

#[test]
fn repeated_parse_failures_degrade_to_wait() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        "I would suggest clicking the icon",
        "Sorry, here is some prose instead of JSON",
        "still no JSON",
        r#"{"action": "done", "params": {}, "reasoning": "recovered"}"#,
    ]));
    let mut executor = ScriptedExecutor::new();
    let history = {
        let mut agent = Agent::new(
            decision,
            Box::new(MockScreen::new(800, 600)),
            Box::new(&mut executor),
            fast_config(5),
        );
        agent.run("anything").unwrap()
    };

    // Three failed attempts collapse into one recorded wait fallback,
    // carrying the parse error in its rationale
    assert_eq!(history.len(), 2);
    let fallback = &history.entries()[0];
    assert_eq!(fallback.action.name, "wait");
    assert_eq!(fallback.status, StepStatus::Success);
    assert!(fallback.action.reasoning.contains("no usable decision"));
    assert!(history.completed());
    // The wait was really executed, not just recorded
    assert_eq!(executor.invocations_of(ActionKind::Wait).len(), 1);
}

#[test]
fn click_is_grounded_through_the_resolver() {
    // The reasoning backend claims (500, 500); the grounding backend places
    // the element at (812, 454) and verifies on the second look
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "click", "params": {"x": 500, "y": 500}, "reasoning": "the settings gear icon"}"#,
        r#"{"action": "done", "params": {}, "reasoning": "settings opened"}"#,
    ]));
    let resolver = test_resolver(&[
        r#"{"x": 812, "y": 454, "reasoning": "gear icon in the toolbar"}"#,
        r#"{"on_target": true, "x": null, "y": null}"#,
    ]);

    let mut executor = ScriptedExecutor::new();
    let history = {
        let mut agent = Agent::new(
            decision,
            Box::new(MockScreen::new(1920, 1080)),
            Box::new(&mut executor),
            fast_config(5),
        )
        .with_resolver(resolver);
        agent.run("open settings").unwrap()
    };

    assert!(history.completed());
    let click = &history.entries()[0];
    assert_eq!(click.status, StepStatus::Success);
    // The grounded coordinates replaced the backend's guess
    assert_eq!(click.action.params["x"], 812);
    assert_eq!(click.action.params["y"], 454);

    let clicks = executor.invocations_of(ActionKind::Click);
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0]["x"], 812);
    assert_eq!(clicks[0]["y"], 454);
}

#[test]
fn coordinate_less_click_stays_at_the_pointer() {
    // A click without explicit coordinates means "click where the pointer
    // is"; grounding must not move it to a freshly resolved target
    struct NoGrounding;

    impl ModelBackend for NoGrounding {
        fn query(&self, _prompt: &str, _observation: Option<&Observation>) -> VlmResult<String> {
            panic!("grounding backend queried for a click-in-place");
        }
    }

    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "click", "params": {"button": "right"}, "reasoning": "context menu at the pointer"}"#,
        r#"{"action": "done", "params": {}, "reasoning": "menu opened"}"#,
    ]));
    let resolver = Resolver::new(
        Box::new(NoGrounding),
        ResolverConfig::default()
            .max_attempts(4)
            .settle(Duration::ZERO),
    );

    let mut executor = ScriptedExecutor::new();
    executor.pointer = (700, 100);
    let history = {
        let mut agent = Agent::new(
            decision,
            Box::new(MockScreen::new(1920, 1080)),
            Box::new(&mut executor),
            fast_config(5),
        )
        .with_resolver(resolver);
        agent.run("open the context menu").unwrap()
    };

    assert!(history.completed());
    let click = &history.entries()[0];
    assert_eq!(click.status, StepStatus::Success);
    assert!(!click.action.params.contains_key("x"));
    assert!(!click.action.params.contains_key("y"));
    // The pointer never moved
    assert!(executor.invocations_of(ActionKind::MoveMouse).is_empty());
    assert_eq!(executor.pointer, (700, 100));
}

#[test]
fn grounding_query_carries_the_decision_reasoning() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "click", "params": {"x": 500, "y": 500}, "reasoning": "the settings gear icon"}"#,
        r#"{"action": "done", "params": {}, "reasoning": "settings opened"}"#,
    ]));
    let prompts = Rc::new(RefCell::new(Vec::new()));
    let resolver = Resolver::new(
        CaptureBackend::new(
            &[r#"{"x": 812, "y": 454}"#, r#"{"on_target": true}"#],
            &prompts,
        ),
        ResolverConfig::default()
            .max_attempts(4)
            .settle(Duration::ZERO),
    );

    let mut agent = Agent::new(
        decision,
        Box::new(MockScreen::new(1920, 1080)),
        Box::new(ScriptedExecutor::new()),
        fast_config(5),
    )
    .with_resolver(resolver);
    let history = agent.run("open settings").unwrap();
    assert!(history.completed());

    // The reasoning text is the grounding description, on every round trip
    let prompts = prompts.borrow();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("the settings gear icon"));
    assert!(prompts[1].contains("the settings gear icon"));
}

#[test]
fn grounding_query_falls_back_when_reasoning_is_empty() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "click", "params": {"x": 500, "y": 500}}"#,
        r#"{"action": "done", "params": {}, "reasoning": "clicked"}"#,
    ]));
    let prompts = Rc::new(RefCell::new(Vec::new()));
    let resolver = Resolver::new(
        CaptureBackend::new(
            &[r#"{"x": 812, "y": 454}"#, r#"{"on_target": true}"#],
            &prompts,
        ),
        ResolverConfig::default()
            .max_attempts(4)
            .settle(Duration::ZERO),
    );

    let mut agent = Agent::new(
        decision,
        Box::new(MockScreen::new(1920, 1080)),
        Box::new(ScriptedExecutor::new()),
        fast_config(5),
    )
    .with_resolver(resolver);
    let history = agent.run("click it").unwrap();
    assert!(history.completed());

    let prompts = prompts.borrow();
    assert!(prompts[0].contains("the target element"));
}

#[test]
fn unresolvable_target_fails_the_step_but_not_the_run() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "click", "params": {"x": 10, "y": 10}, "reasoning": "the phantom button"}"#,
        r#"{"action": "done", "params": {}, "reasoning": "giving up on the button"}"#,
    ]));
    // Grounding never produces an estimate and the pointer read is scripted;
    // refinement degrades to the pointer position, so force a hard failure
    // by making move_mouse error out after an estimate is produced
    let resolver = test_resolver(&[r#"{"x": 300, "y": 300}"#]);

    let mut executor = ScriptedExecutor::new().fail_on(ActionKind::MoveMouse);
    let history = {
        let mut agent = Agent::new(
            decision,
            Box::new(MockScreen::new(800, 600)),
            Box::new(&mut executor),
            fast_config(5),
        )
        .with_resolver(resolver);
        agent.run("click the phantom").unwrap()
    };

    assert_eq!(history.len(), 2);
    let failed = &history.entries()[0];
    assert_eq!(failed.status, StepStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .is_some_and(|e| e.contains("could not resolve")));
    assert!(history.completed());
    // The click itself never fired
    assert!(executor.invocations_of(ActionKind::Click).is_empty());
}

#[test]
fn unknown_action_is_recorded_and_skipped() {
    let decision = DecisionEngine::new(ScriptedBackend::new(&[
        r#"{"action": "levitate", "params": {}, "reasoning": "defy gravity"}"#,
        r#"{"action": "done", "params": {}, "reasoning": "staying grounded"}"#,
    ]));
    let mut executor = ScriptedExecutor::new();
    let history = {
        let mut agent = Agent::new(
            decision,
            Box::new(MockScreen::new(800, 600)),
            Box::new(&mut executor),
            fast_config(5),
        );
        agent.run("anything").unwrap()
    };

    assert_eq!(history.len(), 2);
    assert_eq!(history.entries()[0].status, StepStatus::Failed);
    assert!(executor.invoked.is_empty());
    assert!(history.completed());
}

#[test]
fn history_transcript_reaches_later_prompts() {
    // A backend that inspects its prompt: fails if the transcript of the
    // first action is missing from the second request
    struct TranscriptCheck {
        calls: RefCell<u32>,
    }

    impl ModelBackend for TranscriptCheck {
        fn query(&self, prompt: &str, _observation: Option<&Observation>) -> VlmResult<String> {
            let mut calls = self.calls.borrow_mut();
            *calls += 1;
            match *calls {
                1 => Ok(r#"{"action": "new_tab", "params": {}, "reasoning": "fresh tab"}"#.into()),
                _ => {
                    assert!(prompt.contains("Last action: new_tab"));
                    Ok(r#"{"action": "done", "params": {}, "reasoning": "ok"}"#.into())
                }
            }
        }
    }

    let decision = DecisionEngine::new(Box::new(TranscriptCheck {
        calls: RefCell::new(0),
    }));
    let mut agent = Agent::new(
        decision,
        Box::new(MockScreen::new(800, 600)),
        Box::new(ScriptedExecutor::new()),
        fast_config(5),
    );

    let history = agent.run("open a tab").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.completed());
}
