//! Coordinate resolver: from an element description to a screen position.
//!
//! Coordinates reported by a vision backend are noisy estimates, not ground
//! truth. Single-shot resolution takes the backend's first answer (rescaled
//! from model space); iterative refinement closes the loop by moving the
//! real pointer there and asking the backend, with the pointer visible,
//! whether it landed on target. Extra round trips buy verified precision.

use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::{ActionError, ActionExecutor};
use crate::observe::{ObserveError, ScreenObserver};
use crate::parse::{extract_json_object, numeric_tokens};
use crate::vlm::{ModelBackend, VlmError};

/// Result type for resolver operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors that can occur during coordinate resolution
#[derive(Debug)]
pub enum ResolveError {
    /// The backend's answer contained no usable coordinate pair
    NoCoordinates { description: String, response: String },
    /// The grounding backend call failed
    Backend(VlmError),
    /// Screen capture failed
    Observe(ObserveError),
    /// Moving or reading the pointer failed
    Pointer(ActionError),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NoCoordinates { description, response } => write!(
                f,
                "No coordinates for '{}' in response: {}",
                description, response
            ),
            ResolveError::Backend(e) => write!(f, "Grounding backend error: {}", e),
            ResolveError::Observe(e) => write!(f, "Observation error: {}", e),
            ResolveError::Pointer(e) => write!(f, "Pointer error: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::NoCoordinates { .. } => None,
            ResolveError::Backend(e) => Some(e),
            ResolveError::Observe(e) => Some(e),
            ResolveError::Pointer(e) => Some(e),
        }
    }
}

impl From<VlmError> for ResolveError {
    fn from(e: VlmError) -> Self {
        ResolveError::Backend(e)
    }
}

impl From<ObserveError> for ResolveError {
    fn from(e: ObserveError) -> Self {
        ResolveError::Observe(e)
    }
}

impl From<ActionError> for ResolveError {
    fn from(e: ActionError) -> Self {
        ResolveError::Pointer(e)
    }
}

/// Resolver configuration; see [`crate::config`] for the defaults.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bound on refinement attempts
    pub max_attempts: u32,
    /// Proposed moves shorter than this are discarded as noise
    pub min_movement_px: f64,
    /// Consecutive sub-threshold proposals tolerated before settling on
    /// the current estimate
    pub max_small_moves: u32,
    /// Pause after each pointer move, letting the cursor render
    pub settle: Duration,
    /// Training resolution of the grounding model, if it differs from the
    /// observed image
    pub model_space: Option<(u32, u32)>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let cfg = crate::config::get();
        Self {
            max_attempts: cfg.pilot.max_resolution_attempts,
            min_movement_px: cfg.pilot.min_movement_px,
            max_small_moves: 2,
            settle: Duration::from_millis(cfg.pilot.settle_ms),
            model_space: cfg.pilot.model_space,
        }
    }
}

impl ResolverConfig {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn min_movement_px(mut self, px: f64) -> Self {
        self.min_movement_px = px;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn model_space(mut self, width: u32, height: u32) -> Self {
        self.model_space = Some((width, height));
        self
    }
}

/// State carried across one iterative resolution; discarded afterwards
#[derive(Debug)]
struct RefinementState {
    attempt: u32,
    current: Option<(i32, i32)>,
    small_moves: u32,
}

/// Answer to the initial "where is it" query
#[derive(Debug, Deserialize)]
struct InitialFix {
    x: i64,
    y: i64,
}

/// Answer to a "is the pointer on target" query
#[derive(Debug, Deserialize)]
struct VerifyFix {
    #[serde(default)]
    on_target: bool,
    x: Option<i64>,
    y: Option<i64>,
}

/// Maps element descriptions to verified screen coordinates.
pub struct Resolver {
    backend: Box<dyn ModelBackend>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(backend: Box<dyn ModelBackend>, config: ResolverConfig) -> Self {
        Self { backend, config }
    }

    /// Single-shot resolution: one observation, one query, one rescale.
    ///
    /// Fails with [`ResolveError::NoCoordinates`] if the backend's answer
    /// holds fewer than two numeric tokens.
    pub fn resolve(
        &self,
        description: &str,
        observer: &mut dyn ScreenObserver,
    ) -> ResolveResult<(i32, i32)> {
        let observation = observer.observe()?;
        let raw = self
            .backend
            .query(&grounding_prompt(description), Some(&observation))?;

        let tokens = numeric_tokens(&raw);
        if tokens.len() < 2 {
            return Err(ResolveError::NoCoordinates {
                description: description.to_string(),
                response: raw,
            });
        }

        let model_space = self
            .config
            .model_space
            .unwrap_or((observation.width, observation.height));
        Ok(rescale(
            (tokens[0], tokens[1]),
            model_space,
            (observation.screen_width, observation.screen_height),
        ))
    }

    /// Iterative refinement: move the pointer to the estimate, re-observe
    /// with the pointer visible, and let the backend correct it until it
    /// reports on-target or attempts run out.
    ///
    /// Convergence failure degrades to best effort: once the attempt budget
    /// is spent this returns the last accepted estimate, or the live
    /// pointer position if no estimate was ever established.
    pub fn refine(
        &self,
        description: &str,
        observer: &mut dyn ScreenObserver,
        executor: &mut dyn ActionExecutor,
    ) -> ResolveResult<(i32, i32)> {
        let mut state = RefinementState {
            attempt: 0,
            current: None,
            small_moves: 0,
        };

        while state.attempt < self.config.max_attempts {
            state.attempt += 1;
            let observation = observer.observe()?;
            let screen = (observation.screen_width, observation.screen_height);
            // The backend answers in the space of the image it was shown,
            // which is smaller than the screen when the capture was
            // downscaled. Estimates live in screen space; everything
            // crossing the backend boundary is rescaled.
            let image = self
                .config
                .model_space
                .unwrap_or((observation.width, observation.height));

            match state.current {
                None => {
                    // Initial: ask for a raw position
                    let raw = self
                        .backend
                        .query(&initial_prompt(description), Some(&observation))?;
                    let Some(fix) = decode::<InitialFix>(&raw) else {
                        continue;
                    };
                    let point = rescale((fix.x, fix.y), image, screen);
                    state.current = Some(point);
                    executor.move_pointer(point.0, point.1)?;
                    thread::sleep(self.config.settle);
                }
                Some(current) => {
                    // Verifying: the pointer is visible in this observation.
                    // The prompt reports the pointer where the backend sees
                    // it, in image space
                    let shown = rescale((current.0 as i64, current.1 as i64), screen, image);
                    let raw = self.backend.query(
                        &verify_prompt(description, shown),
                        Some(&observation),
                    )?;
                    let Some(fix) = decode::<VerifyFix>(&raw) else {
                        continue;
                    };

                    if fix.on_target {
                        return Ok(current);
                    }

                    let (Some(x), Some(y)) = (fix.x, fix.y) else {
                        // Not on target but no correction offered; ask again
                        continue;
                    };
                    let proposed = rescale((x, y), image, screen);

                    if distance(current, proposed) < self.config.min_movement_px {
                        // A micro-adjustment is noise, not signal; do not
                        // adopt it. Backends that keep proposing such moves
                        // would stall the loop, so they get a separate cap.
                        state.small_moves += 1;
                        if state.small_moves >= self.config.max_small_moves {
                            return Ok(current);
                        }
                        continue;
                    }

                    state.small_moves = 0;
                    state.current = Some(proposed);
                    executor.move_pointer(proposed.0, proposed.1)?;
                    thread::sleep(self.config.settle);
                }
            }
        }

        match state.current {
            Some(point) => Ok(point),
            None => Ok(executor.pointer_position()?),
        }
    }
}

/// Linearly map a point from one resolution to another: independently per
/// axis, `to = round(from * to_dim / from_dim)`, clamped into the target
/// space. Identity when the resolutions match.
pub fn rescale(model: (i64, i64), model_space: (u32, u32), screen: (u32, u32)) -> (i32, i32) {
    let axis = |value: i64, model_dim: u32, screen_dim: u32| -> i32 {
        let scaled = (value as f64 * screen_dim as f64 / model_dim.max(1) as f64).round();
        (scaled as i64).clamp(0, screen_dim.saturating_sub(1) as i64) as i32
    };
    (
        axis(model.0, model_space.0, screen.0),
        axis(model.1, model_space.1, screen.1),
    )
}

fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(extract_json_object(raw)?).ok()
}

/// Prompt for single-shot grounding
pub fn grounding_prompt(description: &str) -> String {
    format!(
        "Query:{}\nOutput only the coordinate of one point in your response.\n",
        description
    )
}

/// Prompt for the first refinement attempt
fn initial_prompt(description: &str) -> String {
    format!(
        "Look at the screenshot and find: {description}\n\
        \n\
        Provide the X and Y coordinates for the CENTER of this element.\n\
        \n\
        IMPORTANT: Aim for the dead center of the element, not the edge.\n\
        \n\
        Respond ONLY with JSON:\n\
        {{\n\
        \x20 \"x\": <number>,\n\
        \x20 \"y\": <number>,\n\
        \x20 \"reasoning\": \"why these coordinates point to the center\"\n\
        }}"
    )
}

/// Prompt for verification attempts, with the pointer visible on screen
fn verify_prompt(description: &str, current: (i32, i32)) -> String {
    format!(
        "The cursor is currently visible in the screenshot at position ({x}, {y}).\n\
        \n\
        Target: {description}\n\
        \n\
        CRITICAL INSTRUCTIONS:\n\
        1. Check if the cursor is CENTERED on the target element\n\
        2. If not centered, provide NEW coordinates that are at least 10-20 pixels different\n\
        3. Aim for the DEAD CENTER of the element, not edges or corners\n\
        4. Make BOLD adjustments if you're off\n\
        \n\
        Respond ONLY with JSON:\n\
        {{\n\
        \x20 \"on_target\": true/false,\n\
        \x20 \"x\": <number or null>,\n\
        \x20 \"y\": <number or null>,\n\
        \x20 \"reasoning\": \"cursor position relative to target\"\n\
        }}\n\
        \n\
        If the cursor is NOT on target, you MUST provide new x,y coordinates that differ by at least 10 pixels.",
        x = current.0,
        y = current.1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActionKind, ScriptedExecutor};
    use crate::observe::{MockScreen, Observation, ObserveResult};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Backend that replays canned responses in order
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
        fn query(
            &self,
            _prompt: &str,
            _observation: Option<&crate::observe::Observation>,
        ) -> crate::vlm::VlmResult<String> {
            Ok(self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| r#"{"on_target": true}"#.to_string()))
        }
    }

    /// Backend that also records every prompt it is asked
    struct RecordingBackend {
        responses: RefCell<VecDeque<String>>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl ModelBackend for RecordingBackend {
        fn query(
            &self,
            prompt: &str,
            _observation: Option<&Observation>,
        ) -> crate::vlm::VlmResult<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self
                .responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| r#"{"on_target": true}"#.to_string()))
        }
    }

    /// Observer reporting a screen twice the size of its encoded image,
    /// as happens when a capture is downscaled to the payload budget
    struct HalfScale {
        screen: MockScreen,
    }

    impl ScreenObserver for HalfScale {
        fn observe(&mut self) -> ObserveResult<Observation> {
            let mut obs = self.screen.observe()?;
            obs.screen_width = obs.width * 2;
            obs.screen_height = obs.height * 2;
            Ok(obs)
        }
    }

    fn test_config() -> ResolverConfig {
        ResolverConfig {
            max_attempts: 4,
            min_movement_px: 10.0,
            max_small_moves: 2,
            settle: Duration::ZERO,
            model_space: None,
        }
    }

    #[test]
    fn test_rescale_identity() {
        assert_eq!(rescale((500, 300), (1920, 1080), (1920, 1080)), (500, 300));
    }

    #[test]
    fn test_rescale_linear() {
        // 1000x1000 model space onto a 2000x500 screen
        assert_eq!(rescale((500, 500), (1000, 1000), (2000, 500)), (1000, 250));
    }

    #[test]
    fn test_rescale_clamps_out_of_range() {
        assert_eq!(rescale((5000, -20), (1920, 1080), (1920, 1080)), (1919, 0));
    }

    #[test]
    fn test_single_shot_resolves_and_rescales() {
        let backend = ScriptedBackend::new(&["(500, 500)"]);
        let resolver = Resolver::new(backend, test_config().model_space(1000, 1000));
        let mut screen = MockScreen::new(2000, 1000);
        let point = resolver.resolve("the send button", &mut screen).unwrap();
        assert_eq!(point, (1000, 500));
    }

    #[test]
    fn test_single_shot_identity_resolution_unchanged() {
        let backend = ScriptedBackend::new(&["x=812 y=454"]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(1920, 1080);
        assert_eq!(
            resolver.resolve("the dock", &mut screen).unwrap(),
            (812, 454)
        );
    }

    #[test]
    fn test_single_shot_too_few_tokens_is_error() {
        let backend = ScriptedBackend::new(&["somewhere near the top I think"]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let err = resolver.resolve("the gear icon", &mut screen).unwrap_err();
        assert!(matches!(err, ResolveError::NoCoordinates { .. }));
    }

    #[test]
    fn test_refine_converges_on_target() {
        let backend = ScriptedBackend::new(&[
            r#"{"x": 400, "y": 300, "reasoning": "center of button"}"#,
            r#"{"on_target": true, "x": null, "y": null}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();

        let point = resolver.refine("the button", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (400, 300));
        assert_eq!(exec.invocations_of(ActionKind::MoveMouse).len(), 1);
    }

    #[test]
    fn test_refine_adopts_large_correction() {
        let backend = ScriptedBackend::new(&[
            r#"{"x": 400, "y": 300}"#,
            r#"{"on_target": false, "x": 450, "y": 330}"#,
            r#"{"on_target": true}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();

        let point = resolver.refine("the field", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (450, 330));
        assert_eq!(exec.invocations_of(ActionKind::MoveMouse).len(), 2);
    }

    #[test]
    fn test_refine_discards_sub_threshold_moves() {
        // Corrections under 10px must never be adopted; after the small-move
        // cap the current estimate wins
        let backend = ScriptedBackend::new(&[
            r#"{"x": 400, "y": 300}"#,
            r#"{"on_target": false, "x": 403, "y": 302}"#,
            r#"{"on_target": false, "x": 404, "y": 301}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();

        let point = resolver.refine("the icon", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (400, 300));
        // Only the initial placement moved the pointer
        assert_eq!(exec.invocations_of(ActionKind::MoveMouse).len(), 1);
    }

    #[test]
    fn test_refine_exhaustion_returns_last_estimate() {
        let backend = ScriptedBackend::new(&[
            r#"{"x": 100, "y": 100}"#,
            r#"{"on_target": false, "x": 200, "y": 200}"#,
            r#"{"on_target": false, "x": 300, "y": 300}"#,
            r#"{"on_target": false, "x": 380, "y": 380}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();

        // Four attempts consumed without convergence; last accepted wins
        let point = resolver.refine("the thing", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (380, 380));
    }

    #[test]
    fn test_refine_no_estimate_falls_back_to_pointer() {
        let backend = ScriptedBackend::new(&[
            "not json",
            "still not json",
            "nope",
            "nothing",
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();
        exec.pointer = (123, 456);

        let point = resolver.refine("the ghost", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (123, 456));
    }

    #[test]
    fn test_refine_clamps_estimates_into_screen() {
        let backend = ScriptedBackend::new(&[
            r#"{"x": 9000, "y": -50}"#,
            r#"{"on_target": true}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = MockScreen::new(800, 600);
        let mut exec = ScriptedExecutor::new();

        let point = resolver.refine("off screen", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (799, 0));
    }

    #[test]
    fn test_refine_rescales_image_space_answers_to_screen_space() {
        // 800x600 capture of a 1600x1200 screen; the backend answers in the
        // space of the image it saw
        let backend = ScriptedBackend::new(&[
            r#"{"x": 400, "y": 300}"#,
            r#"{"on_target": true}"#,
        ]);
        let resolver = Resolver::new(backend, test_config());
        let mut screen = HalfScale {
            screen: MockScreen::new(800, 600),
        };
        let mut exec = ScriptedExecutor::new();

        let point = resolver.refine("the button", &mut screen, &mut exec).unwrap();
        assert_eq!(point, (800, 600));
        let moves = exec.invocations_of(ActionKind::MoveMouse);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0]["x"], 800);
        assert_eq!(moves[0]["y"], 600);
    }

    #[test]
    fn test_refine_reports_pointer_to_backend_in_image_space() {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let backend = Box::new(RecordingBackend {
            responses: RefCell::new(
                [r#"{"x": 400, "y": 300}"#, r#"{"on_target": true}"#]
                    .map(str::to_string)
                    .into(),
            ),
            prompts: Rc::clone(&prompts),
        });
        let resolver = Resolver::new(backend, test_config());
        let mut screen = HalfScale {
            screen: MockScreen::new(800, 600),
        };
        let mut exec = ScriptedExecutor::new();

        resolver.refine("the button", &mut screen, &mut exec).unwrap();

        // The pointer sits at (800, 600) on screen; the verify prompt must
        // describe it where the backend sees it in the downscaled image
        let prompts = prompts.borrow();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("(400, 300)"));
        assert!(!prompts[1].contains("(800, 600)"));
    }
}
