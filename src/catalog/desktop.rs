//! Desktop input synthesis via `xdotool` (and friends).
//!
//! Keyboard and mouse events go through the `xdotool` CLI, URLs through
//! `xdg-open`, the same way the model backends go through `curl`: a
//! subprocess per operation, no long-lived device handles. Actions that
//! mutate the UI are followed by a short settle pause so the next
//! observation sees the result.

use std::process::Command;
use std::thread;
use std::time::Duration;

use super::types::{ActionError, ActionExecutor, ActionKind, ActionResult, Params, validate_params};

/// Settle pause after tab/window chords
const CHORD_SETTLE: Duration = Duration::from_millis(300);

/// Settle pause after clipboard chords
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(100);

/// Settle pause while an application launches
const APP_SETTLE: Duration = Duration::from_millis(1500);

/// Settle pause while a page loads
const PAGE_SETTLE: Duration = Duration::from_millis(1000);

/// Catalogue executor that drives a real X11 desktop.
#[derive(Debug, Default)]
pub struct DesktopExecutor;

impl DesktopExecutor {
    pub fn new() -> Self {
        Self
    }

    fn key_chord(&self, chord: &str, settle: Option<Duration>) -> ActionResult<()> {
        run_tool("xdotool", &["key", chord])?;
        if let Some(pause) = settle {
            thread::sleep(pause);
        }
        Ok(())
    }
}

impl ActionExecutor for DesktopExecutor {
    fn invoke(&mut self, kind: ActionKind, params: &Params) -> ActionResult<serde_json::Value> {
        validate_params(kind, params)?;

        match kind {
            ActionKind::TypeText => {
                let text = str_param(kind, params, "text")?;
                let delay_ms = opt_f64(kind, params, "interval")?.unwrap_or(0.0) * 1000.0;
                run_tool(
                    "xdotool",
                    &["type", "--delay", &format!("{}", delay_ms as u64), "--", &text],
                )?;
                Ok(serde_json::json!({"typed": text}))
            }
            ActionKind::PressKey => {
                let key = str_param(kind, params, "key")?;
                let sym = x11_keysym(&key)
                    .ok_or(ActionError::InvalidParam { action: kind.name(), param: "key" })?;
                run_tool("xdotool", &["key", &sym])?;
                Ok(serde_json::json!({"key": key}))
            }
            ActionKind::Hotkey => {
                let keys = list_param(kind, params, "keys")?;
                let chord = keys
                    .iter()
                    .map(|k| x11_keysym(k).ok_or(ActionError::InvalidParam {
                        action: kind.name(),
                        param: "keys",
                    }))
                    .collect::<ActionResult<Vec<_>>>()?
                    .join("+");
                self.key_chord(&chord, None)?;
                Ok(serde_json::json!({"keys": keys}))
            }
            ActionKind::MoveMouse => {
                let (x, y) = point_params(kind, params, "x", "y")?;
                run_tool("xdotool", &["mousemove", &x.to_string(), &y.to_string()])?;
                Ok(serde_json::json!({"x": x, "y": y}))
            }
            ActionKind::Click => {
                if let (Some(x), Some(y)) = (opt_i64(kind, params, "x")?, opt_i64(kind, params, "y")?) {
                    run_tool("xdotool", &["mousemove", &x.to_string(), &y.to_string()])?;
                }
                let button = match opt_str(kind, params, "button")?.as_deref() {
                    None | Some("left") => "1",
                    Some("middle") => "2",
                    Some("right") => "3",
                    Some(_) => {
                        return Err(ActionError::InvalidParam { action: kind.name(), param: "button" });
                    }
                };
                let clicks = opt_i64(kind, params, "clicks")?.unwrap_or(1).max(1);
                run_tool(
                    "xdotool",
                    &["click", "--repeat", &clicks.to_string(), button],
                )?;
                Ok(serde_json::json!({"button": button, "clicks": clicks}))
            }
            ActionKind::Drag => {
                let (fx, fy) = point_params(kind, params, "from_x", "from_y")?;
                let (tx, ty) = point_params(kind, params, "to_x", "to_y")?;
                run_tool("xdotool", &["mousemove", &fx.to_string(), &fy.to_string()])?;
                run_tool("xdotool", &["mousedown", "1"])?;
                run_tool("xdotool", &["mousemove", &tx.to_string(), &ty.to_string()])?;
                run_tool("xdotool", &["mouseup", "1"])?;
                Ok(serde_json::json!({"from": [fx, fy], "to": [tx, ty]}))
            }
            ActionKind::Scroll => {
                if let (Some(x), Some(y)) = (opt_i64(kind, params, "x")?, opt_i64(kind, params, "y")?) {
                    run_tool("xdotool", &["mousemove", &x.to_string(), &y.to_string()])?;
                }
                let clicks = i64_param(kind, params, "clicks")?;
                // X11 wheel: button 4 scrolls up, button 5 scrolls down
                let button = if clicks >= 0 { "4" } else { "5" };
                run_tool(
                    "xdotool",
                    &["click", "--repeat", &clicks.abs().max(1).to_string(), button],
                )?;
                Ok(serde_json::json!({"clicks": clicks}))
            }
            ActionKind::OpenApp => {
                let app = str_param(kind, params, "app_name")?;
                // Drive the desktop launcher the way a user would
                run_tool("xdotool", &["key", "super"])?;
                thread::sleep(Duration::from_millis(500));
                run_tool("xdotool", &["type", "--", &app])?;
                thread::sleep(CHORD_SETTLE);
                run_tool("xdotool", &["key", "Return"])?;
                thread::sleep(APP_SETTLE);
                Ok(serde_json::json!({"app_name": app}))
            }
            ActionKind::CloseWindow => {
                self.key_chord("ctrl+w", Some(CHORD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::SwitchWindow => {
                self.key_chord("alt+Tab", Some(CHORD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::NewTab => {
                self.key_chord("ctrl+t", Some(CHORD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::CloseTab => {
                self.key_chord("ctrl+w", Some(CHORD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Copy => {
                self.key_chord("ctrl+c", Some(CLIPBOARD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Paste => {
                self.key_chord("ctrl+v", Some(CLIPBOARD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Cut => {
                self.key_chord("ctrl+x", Some(CLIPBOARD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::SelectAll => {
                self.key_chord("ctrl+a", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Undo => {
                self.key_chord("ctrl+z", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Redo => {
                self.key_chord("ctrl+y", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Find => {
                self.key_chord("ctrl+f", Some(CHORD_SETTLE))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Save => {
                self.key_chord("ctrl+s", Some(Duration::from_millis(200)))?;
                Ok(serde_json::json!({}))
            }
            ActionKind::OpenUrl => {
                let url = str_param(kind, params, "url")?;
                // Focus the address bar, then type the URL
                self.key_chord("ctrl+l", Some(CHORD_SETTLE))?;
                run_tool("xdotool", &["type", "--delay", "20", "--", &url])?;
                run_tool("xdotool", &["key", "Return"])?;
                thread::sleep(PAGE_SETTLE);
                Ok(serde_json::json!({"url": url}))
            }
            ActionKind::RefreshPage => {
                self.key_chord("ctrl+r", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::GoBack => {
                self.key_chord("alt+Left", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::GoForward => {
                self.key_chord("alt+Right", None)?;
                Ok(serde_json::json!({}))
            }
            ActionKind::Wait => {
                let seconds = f64_param(kind, params, "seconds")?;
                if !(0.0..=60.0).contains(&seconds) {
                    return Err(ActionError::InvalidParam { action: kind.name(), param: "seconds" });
                }
                thread::sleep(Duration::from_secs_f64(seconds));
                Ok(serde_json::json!({"seconds": seconds}))
            }
            ActionKind::Screenshot => {
                let path = match opt_str(kind, params, "filename")? {
                    Some(name) => std::path::PathBuf::from(name),
                    None => std::env::temp_dir().join(format!(
                        "screen-pilot-shot-{}.png",
                        chrono::Utc::now().timestamp_millis()
                    )),
                };
                run_tool("scrot", &["-o", &path.to_string_lossy()])?;
                Ok(serde_json::json!({"saved": path.to_string_lossy()}))
            }
            ActionKind::GetMousePosition => {
                let (x, y) = self.pointer_position()?;
                Ok(serde_json::json!({"x": x, "y": y}))
            }
            ActionKind::GetScreenSize => {
                let out = run_tool("xdotool", &["getdisplaygeometry"])?;
                let mut parts = out.split_whitespace();
                let width: u32 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ActionError::Tool(format!("bad geometry: {}", out)))?;
                let height: u32 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ActionError::Tool(format!("bad geometry: {}", out)))?;
                Ok(serde_json::json!({"width": width, "height": height}))
            }
            ActionKind::Done => Err(ActionError::Tool(
                "completion signal is not an executable action".to_string(),
            )),
        }
    }

    fn pointer_position(&mut self) -> ActionResult<(i32, i32)> {
        let out = run_tool("xdotool", &["getmouselocation", "--shell"])?;
        let mut x = None;
        let mut y = None;
        for line in out.lines() {
            if let Some(v) = line.strip_prefix("X=") {
                x = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("Y=") {
                y = v.trim().parse().ok();
            }
        }
        match (x, y) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(ActionError::Tool(format!("bad mouse location: {}", out))),
        }
    }
}

/// Run an input tool and return its stdout, mapping failure to a tool error
fn run_tool(program: &str, args: &[&str]) -> ActionResult<String> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        ActionError::Tool(format!("failed to launch {}: {}", program, e))
    })?;

    if !output.status.success() {
        return Err(ActionError::Tool(format!(
            "{} {} exited with {}: {}",
            program,
            args.first().unwrap_or(&""),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Map a catalogue key name to its X11 keysym
fn x11_keysym(key: &str) -> Option<String> {
    let sym = match key.to_lowercase().as_str() {
        "enter" | "return" => "Return",
        "escape" | "esc" => "Escape",
        "tab" => "Tab",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" => "Delete",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        "pageup" => "Page_Up",
        "pagedown" => "Page_Down",
        "ctrl" | "control" => "ctrl",
        "alt" => "alt",
        "shift" => "shift",
        "super" | "win" | "command" | "cmd" => "super",
        other => {
            // Single printable characters and F-keys pass through
            if other.chars().count() == 1
                || (other.starts_with('f') && other[1..].parse::<u8>().is_ok())
            {
                return Some(other.to_string());
            }
            return None;
        }
    };
    Some(sym.to_string())
}

// ============================================================================
// Parameter extraction
// ============================================================================

fn get<'a>(params: &'a Params, name: &str) -> Option<&'a serde_json::Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn str_param(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<String> {
    opt_str(kind, params, name)?
        .ok_or(ActionError::MissingParam { action: kind.name(), param: name })
}

fn opt_str(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<Option<String>> {
    match get(params, name) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or(ActionError::InvalidParam { action: kind.name(), param: name }),
    }
}

fn i64_param(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<i64> {
    opt_i64(kind, params, name)?
        .ok_or(ActionError::MissingParam { action: kind.name(), param: name })
}

fn opt_i64(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<Option<i64>> {
    match get(params, name) {
        None => Ok(None),
        // Models sometimes emit coordinates as floats; accept whole numbers
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f.round() as i64))
            .map(Some)
            .ok_or(ActionError::InvalidParam { action: kind.name(), param: name }),
    }
}

fn f64_param(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<f64> {
    opt_f64(kind, params, name)?
        .ok_or(ActionError::MissingParam { action: kind.name(), param: name })
}

fn opt_f64(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<Option<f64>> {
    match get(params, name) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or(ActionError::InvalidParam { action: kind.name(), param: name }),
    }
}

fn list_param(kind: ActionKind, params: &Params, name: &'static str) -> ActionResult<Vec<String>> {
    let value = get(params, name)
        .ok_or(ActionError::MissingParam { action: kind.name(), param: name })?;
    let items = value
        .as_array()
        .ok_or(ActionError::InvalidParam { action: kind.name(), param: name })?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(ActionError::InvalidParam { action: kind.name(), param: name })
        })
        .collect()
}

fn point_params(
    kind: ActionKind,
    params: &Params,
    x_name: &'static str,
    y_name: &'static str,
) -> ActionResult<(i64, i64)> {
    Ok((i64_param(kind, params, x_name)?, i64_param(kind, params, y_name)?))
}
