//! Full-screen capture via external screenshot tools.

use std::path::PathBuf;
use std::process::Command;

use super::types::{Observation, ObserveError, ObserveResult, ScreenObserver, bound_observation};

/// Screenshot tools tried in order: `scrot`, then ImageMagick's `import`
const CAPTURE_TOOLS: [(&str, &[&str]); 2] = [
    ("scrot", &["-o", "-z"]),
    ("import", &["-window", "root"]),
];

/// Observer that shells out to a screenshot tool and bounds the result.
#[derive(Debug, Clone)]
pub struct ScrotObserver {
    /// Largest side of the encoded image; bigger captures are downscaled
    max_dimension: u32,
}

impl ScrotObserver {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for ScrotObserver {
    fn default() -> Self {
        Self::new(crate::config::get().observer.max_dimension)
    }
}

impl ScreenObserver for ScrotObserver {
    fn observe(&mut self) -> ObserveResult<Observation> {
        let path = temp_capture_path();
        let mut last_error = String::new();

        for (tool, args) in CAPTURE_TOOLS {
            match capture_with(tool, args, &path) {
                Ok(()) => {
                    let png = std::fs::read(&path)?;
                    let _ = std::fs::remove_file(&path);
                    return bound_observation(png, self.max_dimension);
                }
                Err(e) => last_error = e,
            }
        }

        Err(ObserveError::Capture(format!(
            "no screenshot tool available: {}",
            last_error
        )))
    }
}

fn capture_with(tool: &str, args: &[&str], path: &PathBuf) -> Result<(), String> {
    let output = Command::new(tool)
        .args(args)
        .arg(path)
        .output()
        .map_err(|e| format!("{}: {}", tool, e))?;

    if !output.status.success() {
        return Err(format!(
            "{}: {}",
            tool,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

fn temp_capture_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "screen-pilot-capture-{}-{}.png",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    ))
}
