pub mod desktop;
pub mod scripted;
pub mod types;

pub use desktop::DesktopExecutor;
pub use scripted::ScriptedExecutor;
pub use types::{
    ActionError, ActionExecutor, ActionKind, ActionResult, Params, descriptions, validate_params,
};
