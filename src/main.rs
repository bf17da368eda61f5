//! Command line interface for screen-pilot.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use screen_pilot::agent::{Agent, AgentConfig, StepEvent};
use screen_pilot::catalog::{self, ActionExecutor, ActionKind, DesktopExecutor, Params};
use screen_pilot::config;
use screen_pilot::decision::DecisionEngine;
use screen_pilot::observe::ScrotObserver;
use screen_pilot::record::History;
use screen_pilot::resolver::{Resolver, ResolverConfig};
use screen_pilot::session::{self, RunSession};
use screen_pilot::vlm::{BackendConfig, VlmClient, check_health};

#[derive(Parser)]
#[command(name = "screen-pilot")]
#[command(about = "Vision-grounded desktop automation agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent toward a goal
    Run {
        /// The goal, in plain language
        goal: String,

        /// Step budget for this run
        #[arg(long, env = config::ENV_MAX_STEPS)]
        max_steps: Option<usize>,

        /// Trust backend-supplied coordinates instead of grounding them
        #[arg(long)]
        no_grounding: bool,

        /// Keep the session directory after the run
        #[arg(long)]
        keep: bool,

        /// Print the final history as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve an element description to screen coordinates
    Locate {
        /// What to look for, e.g. "the blue submit button"
        description: String,

        /// Refine iteratively with the pointer visible instead of a
        /// single-shot query
        #[arg(long)]
        refine: bool,
    },

    /// Click at explicit coordinates after a short countdown
    Click {
        x: i32,
        y: i32,
    },

    /// Print the action catalogue
    Actions,

    /// Check that the configured backends are reachable
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            goal,
            max_steps,
            no_grounding,
            keep,
            json,
        } => cmd_run(&goal, max_steps, no_grounding, keep, json),
        Commands::Locate {
            description,
            refine,
        } => cmd_locate(&description, refine),
        Commands::Click { x, y } => cmd_click(x, y),
        Commands::Actions => cmd_actions(),
        Commands::Check => cmd_check(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(
    goal: &str,
    max_steps: Option<usize>,
    no_grounding: bool,
    keep: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut agent_config = AgentConfig::default();
    if let Some(steps) = max_steps {
        agent_config = agent_config.max_steps(steps);
    }

    let session = RunSession::create(goal)?;
    let session = if keep { session.keep() } else { session };
    println!("Goal: {}", goal);
    println!("Session: {}", session.dir.display());
    println!();

    let decision = DecisionEngine::new(Box::new(VlmClient::new(BackendConfig::reasoning())));
    let mut agent = Agent::new(
        decision,
        Box::new(ScrotObserver::default()),
        Box::new(DesktopExecutor::new()),
        agent_config,
    )
    .on_event(print_event)
    .on_observation(|step, observation| {
        // Best effort; a full disk should not kill the run
        let _ = session.save_observation(step, observation);
    });

    if !no_grounding {
        let resolver = Resolver::new(
            Box::new(VlmClient::new(BackendConfig::grounding())),
            ResolverConfig::default(),
        );
        agent = agent.with_resolver(resolver);
    }

    let history = agent.run(goal)?;
    session.save_history(&history)?;

    println!();
    print_summary(&history);
    if json {
        println!("{}", history.to_json()?);
    }
    println!("History saved to {}", session.history_path().display());

    // Old throwaway sessions accumulate under /tmp; prune quietly
    let _ = session::cleanup_old_sessions(&config::get().session.base_dir, 10);
    Ok(())
}

fn print_event(event: &StepEvent) {
    match event {
        StepEvent::StepStarted { step, max_steps } => {
            println!("--- Step {}/{} ---", step, max_steps);
        }
        StepEvent::Decided { name, reasoning } => {
            println!("  Decision: {} ({})", name, reasoning);
        }
        StepEvent::DecisionRetry { attempt, error } => {
            println!("  Decision attempt {} failed: {}", attempt, error);
        }
        StepEvent::DecisionFallback => {
            println!("  No usable decision; waiting before the next step");
        }
        StepEvent::Resolving { description } => {
            println!("  Locating: {}", description);
        }
        StepEvent::Resolved { x, y } => {
            println!("  Target at ({}, {})", x, y);
        }
        StepEvent::Executed { name, ok, detail } => {
            if *ok {
                println!("  OK {}", detail);
            } else {
                println!("  FAILED {}: {}", name, detail);
            }
        }
        StepEvent::Completed { reasoning } => {
            println!("  Done: {}", reasoning);
        }
        StepEvent::BudgetExhausted => {
            println!("  Step budget exhausted before completion");
        }
    }
}

fn print_summary(history: &History) {
    println!("Steps taken: {}", history.len());
    println!("Successful:  {}", history.success_count());
    println!(
        "Outcome:     {}",
        if history.completed() {
            "goal completed"
        } else {
            "incomplete"
        }
    );
}

fn cmd_locate(description: &str, refine: bool) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = Resolver::new(
        Box::new(VlmClient::new(BackendConfig::grounding())),
        ResolverConfig::default(),
    );
    let mut observer = ScrotObserver::default();

    let (x, y) = if refine {
        let mut executor = DesktopExecutor::new();
        resolver.refine(description, &mut observer, &mut executor)?
    } else {
        resolver.resolve(description, &mut observer)?
    };

    println!("({}, {})", x, y);
    Ok(())
}

fn cmd_click(x: i32, y: i32) -> Result<(), Box<dyn std::error::Error>> {
    println!("Clicking at ({}, {}) in...", x, y);
    for n in (1..=3).rev() {
        println!("  {}...", n);
        thread::sleep(Duration::from_secs(1));
    }

    let mut executor = DesktopExecutor::new();
    let mut params = Params::new();
    params.insert("x".to_string(), x.into());
    params.insert("y".to_string(), y.into());
    executor.invoke(ActionKind::Click, &params)?;
    println!("Clicked.");
    Ok(())
}

fn cmd_actions() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&catalog::descriptions())?);
    Ok(())
}

fn cmd_check() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::get();
    let timeout = Duration::from_secs(3);

    let mut all_ok = true;
    for (label, settings) in [("reasoning", &cfg.reasoning), ("grounding", &cfg.grounding)] {
        let reachable = check_health(&settings.endpoint, timeout)?;
        let status = if reachable { "ok" } else { "unreachable" };
        println!("{:<10} {} ({}) {}", label, settings.endpoint, settings.model, status);
        all_ok &= reachable;
    }

    if !all_ok {
        return Err("one or more backends are unreachable".into());
    }
    Ok(())
}
