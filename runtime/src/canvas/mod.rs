//! The drawing surface the VM renders into
//!
//! Rasterization, image storage and display belong to the host; the VM only
//! talks to it through [`Canvas`]. Coordinates reaching a canvas are already
//! clamped to the canvas bounds.

mod recorder;

pub use recorder::{CanvasCall, RecordingCanvas};

use std::fmt;

/// An RGBA color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build a color from script values, clamping each channel into 0..=255
    pub fn from_components(components: [f32; 4]) -> Self {
        let [r, g, b, a] = components.map(|c| c.clamp(0.0, 255.0) as u8);
        Self { r, g, b, a }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// A pixel position inside the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Host-side drawing surface with a set of image buffers
///
/// Buffer 0 is the live canvas; buffers `1..count` are offscreen images
/// created by [`Canvas::allocate_buffers`].
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Prepare `count` buffers (including the live one) for a new program
    fn allocate_buffers(&mut self, count: u32);
    /// Drop the offscreen buffers once the program halts
    fn release_buffers(&mut self);

    fn draw_pixel(&mut self, buffer: u32, at: Pixel, color: Rgba);
    /// Horizontal run of `length` pixels starting at `from`
    fn draw_stroke(&mut self, buffer: u32, from: Pixel, length: u32, color: Rgba);
    fn draw_line(&mut self, buffer: u32, from: Pixel, to: Pixel, line_width: f32, color: Rgba);
    fn draw_rect(&mut self, buffer: u32, origin: Pixel, width: u32, height: u32, line_width: f32, color: Rgba);
    fn draw_circle(&mut self, buffer: u32, center: Pixel, radius: f32, line_width: f32, color: Rgba);
    fn fill_rect(&mut self, buffer: u32, origin: Pixel, width: u32, height: u32, color: Rgba);
    fn fill_circle(&mut self, buffer: u32, center: Pixel, radius: f32, color: Rgba);

    /// Copy the whole of `src` into `dst`
    fn copy_buffer(&mut self, dst: u32, src: u32);
    /// The live canvas changed and should be presented
    fn notify_updated(&mut self);
}
