//! Observation types shared by all screen observers.

use std::io::Cursor;

/// A still image of current screen state.
///
/// `width`/`height` are the dimensions of the encoded image the backends
/// will see; `screen_width`/`screen_height` are the live screen dimensions
/// at capture time. The two differ when the capture was downscaled to fit
/// the backend's payload budget. Observations are ephemeral: one decision
/// or grounding call, then dropped.
#[derive(Debug, Clone)]
pub struct Observation {
    /// PNG-encoded image data
    pub data: Vec<u8>,
    /// Encoded image width in pixels
    pub width: u32,
    /// Encoded image height in pixels
    pub height: u32,
    /// Live screen width in pixels
    pub screen_width: u32,
    /// Live screen height in pixels
    pub screen_height: u32,
}

impl Observation {
    /// Observation whose image is the screen itself (no downscale)
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            screen_width: width,
            screen_height: height,
        }
    }
}

/// Result type for observer operations
pub type ObserveResult<T> = Result<T, ObserveError>;

/// Errors that can occur while capturing the screen
#[derive(Debug)]
pub enum ObserveError {
    /// The capture tool failed or produced no image
    Capture(String),
    /// The captured bytes could not be decoded or re-encoded
    Encode(String),
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for ObserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObserveError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            ObserveError::Encode(msg) => write!(f, "Image encoding failed: {}", msg),
            ObserveError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ObserveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObserveError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ObserveError {
    fn from(err: std::io::Error) -> Self {
        ObserveError::Io(err)
    }
}

/// Produces bounded-size still images of current screen state on demand.
pub trait ScreenObserver {
    fn observe(&mut self) -> ObserveResult<Observation>;
}

/// Decode PNG bytes and downscale so neither side exceeds `max_dimension`,
/// preserving aspect ratio. Returns the (possibly re-encoded) observation
/// with the original dimensions recorded as the screen size.
pub fn bound_observation(png: Vec<u8>, max_dimension: u32) -> ObserveResult<Observation> {
    let img = image::load_from_memory(&png)
        .map_err(|e| ObserveError::Encode(format!("failed to decode capture: {}", e)))?;
    let (native_w, native_h) = (img.width(), img.height());

    if native_w <= max_dimension && native_h <= max_dimension {
        return Ok(Observation::new(png, native_w, native_h));
    }

    let scaled = img.resize(
        max_dimension,
        max_dimension,
        image::imageops::FilterType::Lanczos3,
    );
    let mut data = Vec::new();
    scaled
        .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
        .map_err(|e| ObserveError::Encode(format!("failed to encode PNG: {}", e)))?;

    Ok(Observation {
        width: scaled.width(),
        height: scaled.height(),
        screen_width: native_w,
        screen_height: native_h,
        data,
    })
}
