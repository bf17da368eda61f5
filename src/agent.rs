//! Step-wise agent loop: observe, decide, resolve, execute, record.
//!
//! Each step captures the screen, asks the reasoning backend for exactly
//! one action, grounds positional actions through the resolver, executes,
//! and appends the outcome to the history that feeds the next decision.
//! Single failures are recorded and fed back rather than aborted on; only
//! a broken observation path ends a run early.

use std::thread;
use std::time::Duration;

use crate::catalog::{ActionExecutor, ActionKind};
use crate::decision::{Decision, DecisionEngine, DecisionError};
use crate::observe::{Observation, ObserveError, ScreenObserver};
use crate::record::{ActionRecord, ExecutionOutcome, History};
use crate::resolver::Resolver;

/// Decision requests that fail are retried this many times before the
/// loop falls back to waiting
const DECISION_RETRIES: u32 = 3;

/// Result type for agent runs
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that abort a run
#[derive(Debug)]
pub enum AgentError {
    /// The screen could not be observed; without observations every
    /// subsequent decision would be blind
    Observe(ObserveError),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Observe(e) => write!(f, "Observation failed: {}", e),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Observe(e) => Some(e),
        }
    }
}

impl From<ObserveError> for AgentError {
    fn from(e: ObserveError) -> Self {
        AgentError::Observe(e)
    }
}

/// Outcome of one decision fetch, retries included
enum DecisionFetch {
    /// The backend produced a usable decision
    Decided(Decision),
    /// Every retry failed; the caller should wait and try a fresh step
    Exhausted(DecisionError),
}

/// Loop tunables; defaults come from [`crate::config`]
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Step budget per run
    pub max_steps: usize,
    /// Pause between decision retries
    pub retry_backoff: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let cfg = crate::config::get();
        Self {
            max_steps: cfg.pilot.max_steps,
            retry_backoff: Duration::from_millis(cfg.pilot.retry_backoff_ms),
        }
    }
}

impl AgentConfig {
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// A step is starting
    StepStarted { step: usize, max_steps: usize },
    /// The reasoning backend chose an action
    Decided { name: String, reasoning: String },
    /// A decision request failed and will be retried
    DecisionRetry { attempt: u32, error: String },
    /// All decision retries failed; waiting before the next step
    DecisionFallback,
    /// A positional action is being grounded
    Resolving { description: String },
    /// Grounding produced screen coordinates
    Resolved { x: i32, y: i32 },
    /// An action finished; mirrors the history entry just recorded
    Executed { name: String, ok: bool, detail: String },
    /// The backend signalled completion
    Completed { reasoning: String },
    /// The step budget ran out before completion
    BudgetExhausted,
}

type EventSink<'a> = Box<dyn FnMut(&StepEvent) + 'a>;
type ObservationSink<'a> = Box<dyn FnMut(usize, &Observation) + 'a>;

fn notify(sink: &mut Option<EventSink<'_>>, event: StepEvent) {
    if let Some(sink) = sink {
        sink(&event);
    }
}

/// Whether a decided action's target should be re-derived through
/// grounding. Moves always are; clicks only when the decision supplied
/// explicit coordinates, so a click-in-place (e.g. a right-click at the
/// current pointer position) is left untouched.
fn wants_grounding(kind: ActionKind, params: &crate::catalog::Params) -> bool {
    match kind {
        ActionKind::MoveMouse => true,
        ActionKind::Click => {
            params.get("x").is_some_and(|v| !v.is_null())
                && params.get("y").is_some_and(|v| !v.is_null())
        }
        _ => false,
    }
}

/// The goal-directed automation loop.
///
/// Composes a decision engine, an optional coordinate resolver, a screen
/// observer, and an action executor. Without a resolver, positional
/// actions use whatever coordinates the reasoning backend supplied.
pub struct Agent<'a> {
    decision: DecisionEngine,
    resolver: Option<Resolver>,
    observer: Box<dyn ScreenObserver + 'a>,
    executor: Box<dyn ActionExecutor + 'a>,
    config: AgentConfig,
    on_event: Option<EventSink<'a>>,
    on_observation: Option<ObservationSink<'a>>,
}

impl<'a> Agent<'a> {
    pub fn new(
        decision: DecisionEngine,
        observer: Box<dyn ScreenObserver + 'a>,
        executor: Box<dyn ActionExecutor + 'a>,
        config: AgentConfig,
    ) -> Self {
        Self {
            decision,
            resolver: None,
            observer,
            executor,
            config,
            on_event: None,
            on_observation: None,
        }
    }

    /// Attach a coordinate resolver. Pointer moves, and clicks that carry
    /// explicit coordinates, will then ignore the backend-supplied
    /// coordinates and ground the target description instead
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Attach a progress callback
    pub fn on_event(mut self, sink: impl FnMut(&StepEvent) + 'a) -> Self {
        self.on_event = Some(Box::new(sink));
        self
    }

    /// Attach a sink for the observation that opens each step, keyed by
    /// step number; used to keep per-step screenshots as run artifacts
    pub fn on_observation(mut self, sink: impl FnMut(usize, &Observation) + 'a) -> Self {
        self.on_observation = Some(Box::new(sink));
        self
    }

    fn emit(&mut self, event: StepEvent) {
        notify(&mut self.on_event, event);
    }

    /// Run the loop until the backend signals done or the step budget is
    /// spent. Returns the full history either way; budget exhaustion is a
    /// normal ending, not an error.
    pub fn run(&mut self, goal: &str) -> AgentResult<History> {
        let mut history = History::new();
        let max_steps = self.config.max_steps;

        for step in 1..=max_steps {
            self.emit(StepEvent::StepStarted { step, max_steps });

            let record = match self.fetch_decision(goal, &history, step)? {
                DecisionFetch::Decided(Decision::Done(record)) => {
                    self.emit(StepEvent::Completed {
                        reasoning: record.reasoning.clone(),
                    });
                    history.push(ExecutionOutcome::complete(record));
                    return Ok(history);
                }
                DecisionFetch::Decided(Decision::Act(record)) => {
                    self.emit(StepEvent::Decided {
                        name: record.name.clone(),
                        reasoning: record.reasoning.clone(),
                    });
                    record
                }
                DecisionFetch::Exhausted(error) => {
                    // Keep the loop alive; a later observation may prompt a
                    // cleaner answer. The original error rides along in the
                    // recorded rationale
                    self.emit(StepEvent::DecisionFallback);
                    let mut record = ActionRecord::new(
                        "wait",
                        format!("no usable decision after retries ({}), waiting", error),
                    );
                    record
                        .params
                        .insert("seconds".to_string(), serde_json::json!(1.0));
                    let outcome = match self.executor.invoke(ActionKind::Wait, &record.params) {
                        Ok(result) => ExecutionOutcome::success(record, result),
                        Err(e) => ExecutionOutcome::failed(record, e.to_string()),
                    };
                    history.push(outcome);
                    continue;
                }
            };

            let outcome = self.perform(record);
            self.emit(StepEvent::Executed {
                name: outcome.action.name.clone(),
                ok: outcome.error.is_none(),
                detail: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| outcome.action.describe()),
            });
            history.push(outcome);
        }

        self.emit(StepEvent::BudgetExhausted);
        Ok(history)
    }

    /// One decision request with retries; backoff between attempts, fresh
    /// observation each time
    fn fetch_decision(
        &mut self,
        goal: &str,
        history: &History,
        step: usize,
    ) -> AgentResult<DecisionFetch> {
        let mut last_error = None;
        for attempt in 1..=DECISION_RETRIES {
            let observation = self.observer.observe()?;
            if attempt == 1 {
                if let Some(sink) = &mut self.on_observation {
                    sink(step, &observation);
                }
            }
            match self.decision.decide(goal, history, &observation) {
                Ok(decision) => return Ok(DecisionFetch::Decided(decision)),
                Err(error) => {
                    self.emit(StepEvent::DecisionRetry {
                        attempt,
                        error: error.to_string(),
                    });
                    last_error = Some(error);
                    if attempt < DECISION_RETRIES {
                        thread::sleep(self.config.retry_backoff);
                    }
                }
            }
        }
        // last_error is always set after a full round of failed attempts
        let error = last_error
            .unwrap_or_else(|| DecisionError::Parse("no decision attempt made".to_string()));
        Ok(DecisionFetch::Exhausted(error))
    }

    /// Ground (if needed) and execute one decided action
    fn perform(&mut self, mut record: ActionRecord) -> ExecutionOutcome {
        let Some(kind) = ActionKind::from_name(&record.name) else {
            let error = format!("unknown action '{}'", record.name);
            return ExecutionOutcome::failed(record, error);
        };

        if wants_grounding(kind, &record.params) {
            if let Some(resolver) = &self.resolver {
                // The backend's own pixel estimates are unreliable; ground
                // the described target instead
                let description = if record.reasoning.is_empty() {
                    match kind {
                        ActionKind::Click => "the target element".to_string(),
                        _ => "the target position".to_string(),
                    }
                } else {
                    record.reasoning.clone()
                };
                // Field-level access keeps the resolver borrow disjoint
                // from the sink, observer, and executor
                notify(
                    &mut self.on_event,
                    StepEvent::Resolving {
                        description: description.clone(),
                    },
                );

                match resolver.refine(
                    &description,
                    self.observer.as_mut(),
                    self.executor.as_mut(),
                ) {
                    Ok((x, y)) => {
                        notify(&mut self.on_event, StepEvent::Resolved { x, y });
                        record.params.insert("x".to_string(), serde_json::json!(x));
                        record.params.insert("y".to_string(), serde_json::json!(y));
                    }
                    Err(e) => {
                        return ExecutionOutcome::failed(
                            record,
                            format!("could not resolve target: {}", e),
                        );
                    }
                }
            }
        }

        match self.executor.invoke(kind, &record.params) {
            Ok(result) => ExecutionOutcome::success(record, result),
            Err(e) => ExecutionOutcome::failed(record, e.to_string()),
        }
    }
}
