pub mod mock;
pub mod screen;
pub mod types;

pub use mock::MockScreen;
pub use screen::ScrotObserver;
pub use types::{Observation, ObserveError, ObserveResult, ScreenObserver, bound_observation};
