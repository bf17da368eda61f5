//! Configuration with environment variable support.
//!
//! Constructors take explicit config values; the environment only populates
//! defaults, cached on first access.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SCREEN_PILOT_REASONING_ENDPOINT` | Reasoning backend chat endpoint | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `SCREEN_PILOT_REASONING_MODEL` | Reasoning model name | `qwen3` |
//! | `SCREEN_PILOT_REASONING_KEY` | Bearer token for the reasoning backend | none |
//! | `SCREEN_PILOT_GROUNDING_ENDPOINT` | Grounding backend chat endpoint | same as reasoning |
//! | `SCREEN_PILOT_GROUNDING_MODEL` | Grounding model name | `ui-tars` |
//! | `SCREEN_PILOT_GROUNDING_KEY` | Bearer token for the grounding backend | none |
//! | `SCREEN_PILOT_MODEL_SPACE` | Grounding training resolution as `WxH` | none (image space) |
//! | `SCREEN_PILOT_MAX_STEPS` | Step budget per run | `15` |
//! | `SCREEN_PILOT_MAX_RESOLUTION_ATTEMPTS` | Grounding refinement attempts | `4` |
//! | `SCREEN_PILOT_MIN_MOVEMENT_PX` | Smallest trusted refinement move | `10` |
//! | `SCREEN_PILOT_SETTLE_MS` | Pause after pointer moves (ms) | `500` |
//! | `SCREEN_PILOT_RETRY_BACKOFF_MS` | Pause between decision retries (ms) | `1000` |
//! | `SCREEN_PILOT_MAX_DIMENSION` | Largest observation side in pixels | `1920` |
//! | `SCREEN_PILOT_SESSION_DIR` | Base directory for run artifacts | `/tmp/screen-pilot` |

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default chat completions endpoint for both backends
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default reasoning model name
pub const DEFAULT_REASONING_MODEL: &str = "qwen3";

/// Default grounding model name
pub const DEFAULT_GROUNDING_MODEL: &str = "ui-tars";

/// Default step budget per run
pub const DEFAULT_MAX_STEPS: usize = 15;

/// Default bound on grounding refinement attempts
pub const DEFAULT_MAX_RESOLUTION_ATTEMPTS: u32 = 4;

/// Proposed refinement moves below this distance are noise, not signal
pub const DEFAULT_MIN_MOVEMENT_PX: f64 = 10.0;

/// Default pause after pointer moves (milliseconds)
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// Default pause between decision retries (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Default bound on the encoded observation's largest side
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/screen-pilot";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_REASONING_ENDPOINT: &str = "SCREEN_PILOT_REASONING_ENDPOINT";
pub const ENV_REASONING_MODEL: &str = "SCREEN_PILOT_REASONING_MODEL";
pub const ENV_REASONING_KEY: &str = "SCREEN_PILOT_REASONING_KEY";
pub const ENV_GROUNDING_ENDPOINT: &str = "SCREEN_PILOT_GROUNDING_ENDPOINT";
pub const ENV_GROUNDING_MODEL: &str = "SCREEN_PILOT_GROUNDING_MODEL";
pub const ENV_GROUNDING_KEY: &str = "SCREEN_PILOT_GROUNDING_KEY";
pub const ENV_MODEL_SPACE: &str = "SCREEN_PILOT_MODEL_SPACE";
pub const ENV_MAX_STEPS: &str = "SCREEN_PILOT_MAX_STEPS";
pub const ENV_MAX_RESOLUTION_ATTEMPTS: &str = "SCREEN_PILOT_MAX_RESOLUTION_ATTEMPTS";
pub const ENV_MIN_MOVEMENT_PX: &str = "SCREEN_PILOT_MIN_MOVEMENT_PX";
pub const ENV_SETTLE_MS: &str = "SCREEN_PILOT_SETTLE_MS";
pub const ENV_RETRY_BACKOFF_MS: &str = "SCREEN_PILOT_RETRY_BACKOFF_MS";
pub const ENV_MAX_DIMENSION: &str = "SCREEN_PILOT_MAX_DIMENSION";
pub const ENV_SESSION_DIR: &str = "SCREEN_PILOT_SESSION_DIR";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for screen-pilot
#[derive(Debug, Clone)]
pub struct Config {
    /// Reasoning backend settings
    pub reasoning: BackendSettings,
    /// Grounding backend settings
    pub grounding: BackendSettings,
    /// Agent loop and resolver settings
    pub pilot: PilotSettings,
    /// Screen observer settings
    pub observer: ObserverSettings,
    /// Session artifact settings
    pub session: SessionSettings,
}

/// Settings for one model backend
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Chat completions endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Optional bearer token
    pub api_key: Option<String>,
}

/// Tunables for the agent loop and coordinate resolver
#[derive(Debug, Clone)]
pub struct PilotSettings {
    /// Step budget per run
    pub max_steps: usize,
    /// Bound on grounding refinement attempts
    pub max_resolution_attempts: u32,
    /// Smallest refinement adjustment treated as real signal
    pub min_movement_px: f64,
    /// Grounding training resolution, if distinct from the capture
    pub model_space: Option<(u32, u32)>,
    /// Pause after pointer moves (milliseconds)
    pub settle_ms: u64,
    /// Pause between decision retries (milliseconds)
    pub retry_backoff_ms: u64,
}

/// Screen observer settings
#[derive(Debug, Clone)]
pub struct ObserverSettings {
    /// Largest side of the encoded observation
    pub max_dimension: u32,
}

/// Session artifact settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Base directory for run artifacts
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            reasoning: BackendSettings {
                endpoint: env_or(ENV_REASONING_ENDPOINT, DEFAULT_ENDPOINT),
                model: env_or(ENV_REASONING_MODEL, DEFAULT_REASONING_MODEL),
                api_key: env::var(ENV_REASONING_KEY).ok(),
            },
            grounding: BackendSettings {
                endpoint: env::var(ENV_GROUNDING_ENDPOINT)
                    .or_else(|_| env::var(ENV_REASONING_ENDPOINT))
                    .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
                model: env_or(ENV_GROUNDING_MODEL, DEFAULT_GROUNDING_MODEL),
                api_key: env::var(ENV_GROUNDING_KEY).ok(),
            },
            pilot: PilotSettings {
                max_steps: env_parsed(ENV_MAX_STEPS, DEFAULT_MAX_STEPS),
                max_resolution_attempts: env_parsed(
                    ENV_MAX_RESOLUTION_ATTEMPTS,
                    DEFAULT_MAX_RESOLUTION_ATTEMPTS,
                ),
                min_movement_px: env_parsed(ENV_MIN_MOVEMENT_PX, DEFAULT_MIN_MOVEMENT_PX),
                model_space: env::var(ENV_MODEL_SPACE)
                    .ok()
                    .and_then(|s| parse_model_space(&s)),
                settle_ms: env_parsed(ENV_SETTLE_MS, DEFAULT_SETTLE_MS),
                retry_backoff_ms: env_parsed(ENV_RETRY_BACKOFF_MS, DEFAULT_RETRY_BACKOFF_MS),
            },
            observer: ObserverSettings {
                max_dimension: env_parsed(ENV_MAX_DIMENSION, DEFAULT_MAX_DIMENSION),
            },
            session: SessionSettings {
                base_dir: env_or(ENV_SESSION_DIR, DEFAULT_SESSION_DIR),
            },
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            reasoning: BackendSettings {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: DEFAULT_REASONING_MODEL.to_string(),
                api_key: None,
            },
            grounding: BackendSettings {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: DEFAULT_GROUNDING_MODEL.to_string(),
                api_key: None,
            },
            pilot: PilotSettings {
                max_steps: DEFAULT_MAX_STEPS,
                max_resolution_attempts: DEFAULT_MAX_RESOLUTION_ATTEMPTS,
                min_movement_px: DEFAULT_MIN_MOVEMENT_PX,
                model_space: None,
                settle_ms: DEFAULT_SETTLE_MS,
                retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            },
            observer: ObserverSettings {
                max_dimension: DEFAULT_MAX_DIMENSION,
            },
            session: SessionSettings {
                base_dir: DEFAULT_SESSION_DIR.to_string(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a `WxH` resolution string, e.g. "1920x1080"
pub fn parse_model_space(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_space() {
        assert_eq!(parse_model_space("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_model_space("1280 x 720"), Some((1280, 720)));
        assert_eq!(parse_model_space("1920"), None);
        assert_eq!(parse_model_space("axb"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.reasoning.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.pilot.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.pilot.min_movement_px, DEFAULT_MIN_MOVEMENT_PX);
        assert!(config.pilot.model_space.is_none());
        assert_eq!(config.session.base_dir, DEFAULT_SESSION_DIR);
    }
}
