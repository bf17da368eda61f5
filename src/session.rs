//! Run session artifacts: a per-run directory holding metadata and the
//! recorded history.
//!
//! Sessions live under the configured base directory (see
//! [`crate::config`]) and are named by timestamp plus pid, so concurrent
//! runs never collide. They are throwaway by default; `keep` opts a run
//! out of cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::observe::Observation;
use crate::record::History;

/// Name of the metadata file inside each session directory
const META_FILE: &str = ".session.json";

/// Name of the recorded history file
const HISTORY_FILE: &str = "history.json";

/// One run's artifact directory.
#[derive(Debug, Clone)]
pub struct RunSession {
    /// Unique session identifier (directory name)
    pub id: String,
    /// Absolute path of the session directory
    pub dir: PathBuf,
    /// Whether cleanup should skip this session
    pub keep: bool,
}

impl RunSession {
    /// Create a new session directory under the configured base dir
    pub fn create(goal: &str) -> io::Result<Self> {
        Self::create_in(&crate::config::get().session.base_dir, goal)
    }

    /// Create a new session directory under an explicit base dir
    pub fn create_in(base_dir: impl AsRef<Path>, goal: &str) -> io::Result<Self> {
        // Timestamp plus pid disambiguates concurrent processes; the counter
        // disambiguates runs within one process and second
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let id = format!(
            "run-{}-{}-{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let dir = base_dir.as_ref().join(&id);
        fs::create_dir_all(&dir)?;

        let session = Self {
            id,
            dir,
            keep: false,
        };
        session.write_meta(goal)?;
        Ok(session)
    }

    /// Mark this session to survive cleanup
    pub fn keep(mut self) -> Self {
        self.keep = true;
        // Best effort; a failed rewrite leaves the session cleanable
        let _ = self.write_meta_keep();
        self
    }

    fn write_meta(&self, goal: &str) -> io::Result<()> {
        let meta = serde_json::json!({
            "id": self.id,
            "goal": goal,
            "created": chrono::Local::now().to_rfc3339(),
            "keep": self.keep,
        });
        fs::write(
            self.dir.join(META_FILE),
            serde_json::to_string_pretty(&meta)?,
        )
    }

    fn write_meta_keep(&self) -> io::Result<()> {
        let path = self.dir.join(META_FILE);
        let mut meta: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        meta["keep"] = serde_json::json!(true);
        fs::write(&path, serde_json::to_string_pretty(&meta)?)
    }

    /// Path of the history file inside this session
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Save the observation that opened a step as `step-NN.png`
    pub fn save_observation(&self, step: usize, observation: &Observation) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("step-{:02}.png", step));
        fs::write(&path, &observation.data)?;
        Ok(path)
    }

    /// Persist the run history as pretty JSON
    pub fn save_history(&self, history: &History) -> io::Result<()> {
        let json = history
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.history_path(), json)
    }
}

/// List session directories under a base dir, newest first
pub fn list_sessions(base_dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut sessions = Vec::new();
    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(sessions),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(META_FILE).is_file() {
            sessions.push(path);
        }
    }
    sessions.sort();
    sessions.reverse();
    Ok(sessions)
}

/// Remove unkept sessions beyond the newest `keep_latest`
pub fn cleanup_old_sessions(base_dir: impl AsRef<Path>, keep_latest: usize) -> io::Result<usize> {
    let mut removed = 0;
    for path in list_sessions(base_dir)?.into_iter().skip(keep_latest) {
        let meta_path = path.join(META_FILE);
        let kept = fs::read_to_string(&meta_path)
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|m| m["keep"].as_bool())
            .unwrap_or(false);
        if !kept {
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
