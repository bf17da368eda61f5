//! screen-pilot: vision-grounded desktop automation.
//!
//! A goal arrives as plain text; the agent loop repeatedly captures the
//! screen, asks a reasoning backend for the single next action, grounds
//! positional actions through a separate grounding backend, executes them
//! against the desktop, and feeds the recorded outcome into the next
//! decision. Runs end when the backend signals completion or the step
//! budget is spent.
//!
//! # Modules
//!
//! - [`agent`]: the observe/decide/resolve/execute loop
//! - [`decision`]: prompt construction and response parsing for decisions
//! - [`resolver`]: description-to-coordinate grounding with refinement
//! - [`catalog`]: the closed action catalogue and its executors
//! - [`observe`]: screen capture and the mock screen for tests
//! - [`vlm`]: the chat-completions client both backends share
//! - [`record`]: action records, outcomes, and the run history
//! - [`session`]: per-run artifact directories
//! - [`config`]: environment-driven defaults
//!
//! # Example
//!
//! ```no_run
//! use screen_pilot::agent::{Agent, AgentConfig};
//! use screen_pilot::catalog::DesktopExecutor;
//! use screen_pilot::decision::DecisionEngine;
//! use screen_pilot::observe::ScrotObserver;
//! use screen_pilot::resolver::{Resolver, ResolverConfig};
//! use screen_pilot::vlm::{BackendConfig, VlmClient};
//!
//! let decision = DecisionEngine::new(Box::new(VlmClient::new(BackendConfig::reasoning())));
//! let resolver = Resolver::new(
//!     Box::new(VlmClient::new(BackendConfig::grounding())),
//!     ResolverConfig::default(),
//! );
//! let mut agent = Agent::new(
//!     decision,
//!     Box::new(ScrotObserver::default()),
//!     Box::new(DesktopExecutor::new()),
//!     AgentConfig::default(),
//! )
//! .with_resolver(resolver);
//!
//! let history = agent.run("open the browser settings page")?;
//! println!("completed: {}", history.completed());
//! # Ok::<(), screen_pilot::agent::AgentError>(())
//! ```

pub mod agent;
pub mod catalog;
pub mod config;
pub mod decision;
pub mod observe;
pub mod parse;
pub mod record;
pub mod resolver;
pub mod session;
pub mod vlm;

pub use agent::{Agent, AgentConfig, AgentError, StepEvent};
pub use catalog::{ActionError, ActionExecutor, ActionKind, DesktopExecutor, ScriptedExecutor};
pub use decision::{Decision, DecisionEngine, DecisionError};
pub use observe::{MockScreen, Observation, ObserveError, ScreenObserver, ScrotObserver};
pub use record::{ActionRecord, ExecutionOutcome, History, StepStatus};
pub use resolver::{Resolver, ResolverConfig, ResolveError};
pub use session::RunSession;
pub use vlm::{BackendConfig, ModelBackend, VlmClient, VlmError};
