//! A programmable fake screen for testing.
//!
//! Tests draw labeled targets (rectangles, text, a pointer crosshair) and
//! feed the rendered PNG through the same observation path the real
//! observer uses.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::RgbImage;
use std::io::Cursor;

use super::types::{Observation, ObserveError, ObserveResult, ScreenObserver};

/// In-memory RGB screen with a small drawing API.
#[derive(Debug, Clone)]
pub struct MockScreen {
    image: RgbImage,
}

impl MockScreen {
    /// Create a black screen with the given dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    /// Create a screen filled with a solid color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut screen = Self::new(width, height);
        screen.fill(color);
        screen
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill the whole screen with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for pixel in self.image.pixels_mut() {
            *pixel = image::Rgb(color);
        }
    }

    /// Draw a filled rectangle, clipped to the screen
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height()) {
            for px in x..(x + w).min(self.width()) {
                self.image.put_pixel(px, py, image::Rgb(color));
            }
        }
    }

    /// Draw text with 8x8 glyphs; does not wrap
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
            if cursor_x >= self.width() {
                break;
            }
        }
    }

    /// Draw a crosshair centered on (x, y), the mock equivalent of a
    /// visible pointer for refinement tests
    pub fn draw_pointer(&mut self, x: u32, y: u32, color: [u8; 3]) {
        let arm = 6u32;
        self.draw_rect(x.saturating_sub(arm), y, arm * 2 + 1, 1, color);
        self.draw_rect(x, y.saturating_sub(arm), 1, arm * 2 + 1, color);
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= self.height() {
                break;
            }
            for bit in 0..8 {
                let px = x + bit;
                if px >= self.width() {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let is_fg = (row >> bit) & 1 == 1;
                self.image
                    .put_pixel(px, py, image::Rgb(if is_fg { fg } else { bg }));
            }
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width() || y >= self.height() {
            return [0, 0, 0];
        }
        self.image.get_pixel(x, y).0
    }

    /// Encode the screen as PNG bytes
    pub fn to_png(&self) -> ObserveResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| ObserveError::Encode(format!("failed to encode PNG: {}", e)))?;
        Ok(bytes)
    }
}

impl ScreenObserver for MockScreen {
    fn observe(&mut self) -> ObserveResult<Observation> {
        Ok(Observation::new(self.to_png()?, self.width(), self.height()))
    }
}
