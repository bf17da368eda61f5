//! The closed catalogue of atomic input actions.
//!
//! Every action the reasoning backend may request is a variant here; names
//! arriving from the backend are resolved with [`ActionKind::from_name`] and
//! an unknown name is a typed error, never a dynamic dispatch failure.

use serde::{Deserialize, Serialize};

/// Parameter mapping attached to an action
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Every atomic action the agent can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // Keyboard
    TypeText,
    PressKey,
    Hotkey,
    // Mouse
    MoveMouse,
    Click,
    Drag,
    Scroll,
    // Applications
    OpenApp,
    CloseWindow,
    SwitchWindow,
    NewTab,
    CloseTab,
    // Clipboard
    Copy,
    Paste,
    Cut,
    SelectAll,
    // Text editing
    Undo,
    Redo,
    Find,
    Save,
    // Browser
    OpenUrl,
    RefreshPage,
    GoBack,
    GoForward,
    // Utility
    Wait,
    Screenshot,
    GetMousePosition,
    GetScreenSize,
    /// Completion signal; intercepted by the agent loop, never executed
    Done,
}

impl ActionKind {
    pub const ALL: [ActionKind; 29] = [
        ActionKind::TypeText,
        ActionKind::PressKey,
        ActionKind::Hotkey,
        ActionKind::MoveMouse,
        ActionKind::Click,
        ActionKind::Drag,
        ActionKind::Scroll,
        ActionKind::OpenApp,
        ActionKind::CloseWindow,
        ActionKind::SwitchWindow,
        ActionKind::NewTab,
        ActionKind::CloseTab,
        ActionKind::Copy,
        ActionKind::Paste,
        ActionKind::Cut,
        ActionKind::SelectAll,
        ActionKind::Undo,
        ActionKind::Redo,
        ActionKind::Find,
        ActionKind::Save,
        ActionKind::OpenUrl,
        ActionKind::RefreshPage,
        ActionKind::GoBack,
        ActionKind::GoForward,
        ActionKind::Wait,
        ActionKind::Screenshot,
        ActionKind::GetMousePosition,
        ActionKind::GetScreenSize,
        ActionKind::Done,
    ];

    /// Resolve a catalogue name to its variant
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The name advertised to the reasoning backend
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::TypeText => "type_text",
            ActionKind::PressKey => "press_key",
            ActionKind::Hotkey => "hotkey",
            ActionKind::MoveMouse => "move_mouse",
            ActionKind::Click => "click",
            ActionKind::Drag => "drag",
            ActionKind::Scroll => "scroll",
            ActionKind::OpenApp => "open_app",
            ActionKind::CloseWindow => "close_window",
            ActionKind::SwitchWindow => "switch_window",
            ActionKind::NewTab => "new_tab",
            ActionKind::CloseTab => "close_tab",
            ActionKind::Copy => "copy",
            ActionKind::Paste => "paste",
            ActionKind::Cut => "cut",
            ActionKind::SelectAll => "select_all",
            ActionKind::Undo => "undo",
            ActionKind::Redo => "redo",
            ActionKind::Find => "find",
            ActionKind::Save => "save",
            ActionKind::OpenUrl => "open_url",
            ActionKind::RefreshPage => "refresh_page",
            ActionKind::GoBack => "go_back",
            ActionKind::GoForward => "go_forward",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
            ActionKind::GetMousePosition => "get_mouse_position",
            ActionKind::GetScreenSize => "get_screen_size",
            ActionKind::Done => "done",
        }
    }

    /// Whether this action targets a screen position that should be
    /// re-derived through grounding before dispatch
    pub fn is_positional(self) -> bool {
        matches!(self, ActionKind::Click | ActionKind::MoveMouse)
    }

    /// Parameter names this action accepts; anything else is rejected
    pub fn allowed_params(self) -> &'static [&'static str] {
        match self {
            ActionKind::TypeText => &["text", "interval"],
            ActionKind::PressKey => &["key"],
            ActionKind::Hotkey => &["keys"],
            ActionKind::MoveMouse => &["x", "y", "duration"],
            ActionKind::Click => &["x", "y", "button", "clicks"],
            ActionKind::Drag => &["from_x", "from_y", "to_x", "to_y", "duration", "button"],
            ActionKind::Scroll => &["clicks", "x", "y"],
            ActionKind::OpenApp => &["app_name"],
            ActionKind::OpenUrl => &["url"],
            ActionKind::Wait => &["seconds"],
            ActionKind::Screenshot => &["filename"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Serialized catalogue for the decision prompt: name, parameter schema,
/// and one example per action. The completion signal is documented in the
/// prompt rules instead, so it is omitted here.
pub fn descriptions() -> serde_json::Value {
    serde_json::json!({
        "type_text": {
            "description": "Type text character by character",
            "params": {"text": "string", "interval": "float seconds between keystrokes (optional)"},
            "example": "type_text('hello world')"
        },
        "press_key": {
            "description": "Press a single key",
            "params": {"key": "string (e.g., 'enter', 'tab', 'escape')"},
            "example": "press_key('enter')"
        },
        "hotkey": {
            "description": "Press multiple keys simultaneously",
            "params": {"keys": "list of strings"},
            "example": "hotkey(['ctrl', 'c'])"
        },
        "move_mouse": {
            "description": "Move mouse to coordinates",
            "params": {"x": "int", "y": "int", "duration": "float (optional)"},
            "example": "move_mouse(100, 200)"
        },
        "click": {
            "description": "Click the mouse",
            "params": {"x": "int (optional)", "y": "int (optional)", "button": "string (optional)", "clicks": "int (optional)"},
            "example": "click(100, 200) or click(button='right')"
        },
        "drag": {
            "description": "Drag from one point to another",
            "params": {"from_x": "int", "from_y": "int", "to_x": "int", "to_y": "int"},
            "example": "drag(100, 100, 200, 200)"
        },
        "scroll": {
            "description": "Scroll mouse wheel (positive=up, negative=down)",
            "params": {"clicks": "int", "x": "int (optional)", "y": "int (optional)"},
            "example": "scroll(5) or scroll(-3)"
        },
        "open_app": {
            "description": "Open an application by name",
            "params": {"app_name": "string"},
            "example": "open_app('Firefox')"
        },
        "close_window": {
            "description": "Close the current window",
            "params": {},
            "example": "close_window()"
        },
        "switch_window": {
            "description": "Switch to next window (Alt+Tab)",
            "params": {},
            "example": "switch_window()"
        },
        "new_tab": {
            "description": "Open new tab in current app",
            "params": {},
            "example": "new_tab()"
        },
        "close_tab": {
            "description": "Close current tab",
            "params": {},
            "example": "close_tab()"
        },
        "copy": {
            "description": "Copy selected content",
            "params": {},
            "example": "copy()"
        },
        "paste": {
            "description": "Paste from clipboard",
            "params": {},
            "example": "paste()"
        },
        "cut": {
            "description": "Cut selected content",
            "params": {},
            "example": "cut()"
        },
        "select_all": {
            "description": "Select all content",
            "params": {},
            "example": "select_all()"
        },
        "undo": {
            "description": "Undo last action",
            "params": {},
            "example": "undo()"
        },
        "redo": {
            "description": "Redo last undone action",
            "params": {},
            "example": "redo()"
        },
        "find": {
            "description": "Open find dialog",
            "params": {},
            "example": "find()"
        },
        "save": {
            "description": "Save current document",
            "params": {},
            "example": "save()"
        },
        "open_url": {
            "description": "Navigate to URL in browser",
            "params": {"url": "string"},
            "example": "open_url('https://github.com')"
        },
        "refresh_page": {
            "description": "Refresh current page",
            "params": {},
            "example": "refresh_page()"
        },
        "go_back": {
            "description": "Go back in browser history",
            "params": {},
            "example": "go_back()"
        },
        "go_forward": {
            "description": "Go forward in browser history",
            "params": {},
            "example": "go_forward()"
        },
        "wait": {
            "description": "Pause for specified seconds",
            "params": {"seconds": "float"},
            "example": "wait(2.0)"
        },
        "screenshot": {
            "description": "Take a screenshot",
            "params": {"filename": "string (optional)"},
            "example": "screenshot('output.png')"
        },
        "get_mouse_position": {
            "description": "Get current mouse coordinates",
            "params": {},
            "example": "get_mouse_position()"
        },
        "get_screen_size": {
            "description": "Get screen width and height",
            "params": {},
            "example": "get_screen_size()"
        }
    })
}

/// Result type for catalogue operations
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors raised while executing catalogue actions
#[derive(Debug)]
pub enum ActionError {
    /// The requested name is not in the catalogue
    UnknownAction(String),
    /// A parameter the action does not accept was supplied
    UnknownParam { action: &'static str, param: String },
    /// A required parameter is missing
    MissingParam { action: &'static str, param: &'static str },
    /// A parameter had the wrong type or an unusable value
    InvalidParam { action: &'static str, param: &'static str },
    /// The underlying input tool failed
    Tool(String),
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::UnknownAction(name) => write!(f, "Unknown action: {}", name),
            ActionError::UnknownParam { action, param } => {
                write!(f, "{} does not accept parameter '{}'", action, param)
            }
            ActionError::MissingParam { action, param } => {
                write!(f, "{} requires parameter '{}'", action, param)
            }
            ActionError::InvalidParam { action, param } => {
                write!(f, "{} parameter '{}' is invalid", action, param)
            }
            ActionError::Tool(msg) => write!(f, "Input tool failed: {}", msg),
            ActionError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ActionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        ActionError::Io(err)
    }
}

/// Reject parameters the action does not declare
pub fn validate_params(kind: ActionKind, params: &Params) -> ActionResult<()> {
    let allowed = kind.allowed_params();
    for key in params.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ActionError::UnknownParam {
                action: kind.name(),
                param: key.clone(),
            });
        }
    }
    Ok(())
}

/// Executes catalogue actions against some input device.
///
/// Implementations are pure executors with no decision logic:
/// `DesktopExecutor` synthesizes real input, `ScriptedExecutor` records
/// invocations for tests.
pub trait ActionExecutor {
    /// Execute one action and return its structured outcome record
    fn invoke(&mut self, kind: ActionKind, params: &Params) -> ActionResult<serde_json::Value>;

    /// Current pointer position in screen coordinates
    fn pointer_position(&mut self) -> ActionResult<(i32, i32)>;

    /// Move the pointer; used by grounding refinement between verifications
    fn move_pointer(&mut self, x: i32, y: i32) -> ActionResult<()> {
        let mut params = Params::new();
        params.insert("x".to_string(), x.into());
        params.insert("y".to_string(), y.into());
        self.invoke(ActionKind::MoveMouse, &params).map(|_| ())
    }
}

impl<T: ActionExecutor + ?Sized> ActionExecutor for &mut T {
    fn invoke(&mut self, kind: ActionKind, params: &Params) -> ActionResult<serde_json::Value> {
        (**self).invoke(kind, params)
    }

    fn pointer_position(&mut self) -> ActionResult<(i32, i32)> {
        (**self).pointer_position()
    }
}
