//! Model backend client for vision-capable chat endpoints.
//!
//! Both the reasoning backend and the grounding backend speak the same
//! OpenAI-style `chat/completions` protocol: a text prompt plus an optional
//! base64 image, answered with free text. Requests go through `curl` with
//! the JSON body spooled to a temp file.
//!
//! # Configuration
//!
//! Backend settings can be configured via environment variables, see
//! [`crate::config`].

use base64::Engine;
use std::process::Command;
use std::time::Duration;

use crate::config;
use crate::observe::Observation;

/// Result type for backend operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur while talking to a model backend
#[derive(Debug)]
pub enum VlmError {
    /// Failed to connect to the endpoint
    ConnectionFailed(String),
    /// The endpoint answered with something other than a completion
    InvalidResponse(String),
    /// IO error
    Io(std::io::Error),
}

impl std::fmt::Display for VlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VlmError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            VlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            VlmError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for VlmError {}

impl From<std::io::Error> for VlmError {
    fn from(e: std::io::Error) -> Self {
        VlmError::Io(e)
    }
}

/// Configuration for one backend client
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Chat completions endpoint URL
    pub endpoint: String,
    /// Model name to request
    pub model: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Maximum tokens in the completion
    pub max_tokens: u32,
    /// Sampling temperature; grounding wants 0.0, reasoning leaves it unset
    pub temperature: Option<f64>,
    /// Timeout for the initial connection (seconds)
    pub connect_timeout: u64,
    /// Timeout for the whole request (seconds)
    pub request_timeout: u64,
}

impl BackendConfig {
    /// Client settings for the configured reasoning backend
    pub fn reasoning() -> Self {
        Self::from_settings(&config::get().reasoning, 500, None)
    }

    /// Client settings for the configured grounding backend
    pub fn grounding() -> Self {
        // Deterministic output; coordinates should not be sampled
        Self::from_settings(&config::get().grounding, 300, Some(0.0))
    }

    fn from_settings(
        settings: &config::BackendSettings,
        max_tokens: u32,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens,
            temperature,
            connect_timeout: 10,
            request_timeout: 120,
        }
    }

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: config::DEFAULT_REASONING_MODEL.to_string(),
            api_key: None,
            max_tokens: 500,
            temperature: None,
            connect_timeout: 10,
            request_timeout: 120,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A backend that answers a text prompt about an optional image.
///
/// Implemented by [`VlmClient`] for real endpoints and by scripted fakes
/// in tests.
pub trait ModelBackend {
    fn query(&self, prompt: &str, observation: Option<&Observation>) -> VlmResult<String>;
}

/// HTTP client for one chat completions endpoint.
#[derive(Debug, Clone)]
pub struct VlmClient {
    config: BackendConfig,
}

impl VlmClient {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl ModelBackend for VlmClient {
    fn query(&self, prompt: &str, observation: Option<&Observation>) -> VlmResult<String> {
        let request = build_request(&self.config, prompt, observation);
        let request_json = serde_json::to_string(&request)
            .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

        // argv has a hard per-argument size limit; a screenshot-bearing body
        // must go through a file
        let body_path = std::env::temp_dir().join(format!(
            "screen-pilot-req-{}-{}.json",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::write(&body_path, &request_json)?;

        let mut cmd = Command::new("curl");
        cmd.args([
            "-s",
            "-X",
            "POST",
            &self.config.endpoint,
            "-H",
            "Content-Type: application/json",
        ]);
        if let Some(key) = &self.config.api_key {
            cmd.args(["-H", &format!("Authorization: Bearer {}", key)]);
        }
        cmd.args([
            "-d",
            &format!("@{}", body_path.display()),
            "--connect-timeout",
            &self.config.connect_timeout.to_string(),
            "--max-time",
            &self.config.request_timeout.to_string(),
        ]);

        let output = cmd.output();
        let _ = std::fs::remove_file(&body_path);
        let output = output?;

        if !output.status.success() {
            return Err(VlmError::ConnectionFailed(format!(
                "curl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        extract_completion(&output.stdout)
    }
}

/// Build the chat completions request body
fn build_request(
    config: &BackendConfig,
    prompt: &str,
    observation: Option<&Observation>,
) -> serde_json::Value {
    let mut content = Vec::new();
    if let Some(obs) = observation {
        let img_base64 = base64::engine::general_purpose::STANDARD.encode(&obs.data);
        content.push(serde_json::json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/png;base64,{}", img_base64)
            }
        }));
    }
    content.push(serde_json::json!({
        "type": "text",
        "text": prompt
    }));

    let mut request = serde_json::json!({
        "model": config.model,
        "messages": [{
            "role": "user",
            "content": content
        }],
        "max_tokens": config.max_tokens
    });
    if let Some(temperature) = config.temperature {
        request["temperature"] = serde_json::json!(temperature);
    }
    request
}

/// Pull the completion text out of a chat completions response
fn extract_completion(body: &[u8]) -> VlmResult<String> {
    let response: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

    let content = response["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("");

    // Thinking models put their answer in reasoning_content instead
    let text = if content.is_empty() {
        response["choices"][0]["message"]["reasoning_content"]
            .as_str()
            .unwrap_or("")
    } else {
        content
    };

    if text.is_empty() {
        return Err(VlmError::InvalidResponse(
            "response contained no completion text".to_string(),
        ));
    }

    Ok(text.to_string())
}

/// Check if a backend endpoint is reachable (connection-only check).
///
/// Only verifies the server accepts connections; completion requests can
/// take much longer than any health probe should.
pub fn check_health(endpoint: &str, timeout: Duration) -> VlmResult<bool> {
    let url = endpoint
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");
    let secs = timeout.as_secs().max(1).to_string();

    let output = Command::new("curl")
        .args([
            "-s",
            "-o",
            "/dev/null",
            "-w",
            "%{http_code}",
            "--connect-timeout",
            &secs,
            "--max-time",
            &secs,
            "-I",
            &format!("http://{}", host_port),
        ])
        .output()?;

    // Any status (even 4xx/5xx) means the server is reachable; 000 means
    // the connection itself failed
    let status = String::from_utf8_lossy(&output.stdout);
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}
