use std::fmt;

use crate::canvas::{Canvas, Pixel, Rgba};

/// One call made against a [`RecordingCanvas`]
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCall {
    AllocateBuffers(u32),
    ReleaseBuffers,
    Pixel { buffer: u32, at: Pixel, color: Rgba },
    Stroke { buffer: u32, from: Pixel, length: u32, color: Rgba },
    Line { buffer: u32, from: Pixel, to: Pixel, line_width: f32, color: Rgba },
    Rect { buffer: u32, origin: Pixel, width: u32, height: u32, line_width: f32, color: Rgba },
    Circle { buffer: u32, center: Pixel, radius: f32, line_width: f32, color: Rgba },
    FillRect { buffer: u32, origin: Pixel, width: u32, height: u32, color: Rgba },
    FillCircle { buffer: u32, center: Pixel, radius: f32, color: Rgba },
    Copy { dst: u32, src: u32 },
    Update,
}

impl fmt::Display for CanvasCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasCall::AllocateBuffers(count) => write!(f, "allocate {} buffer(s)", count),
            CanvasCall::ReleaseBuffers => write!(f, "release buffers"),
            CanvasCall::Pixel { buffer, at, color } => write!(f, "[{}] pixel {} {}", buffer, at, color),
            CanvasCall::Stroke { buffer, from, length, color } => {
                write!(f, "[{}] stroke {} len {} {}", buffer, from, length, color)
            }
            CanvasCall::Line { buffer, from, to, line_width, color } => {
                write!(f, "[{}] line {} -> {} width {} {}", buffer, from, to, line_width, color)
            }
            CanvasCall::Rect { buffer, origin, width, height, line_width, color } => write!(
                f,
                "[{}] rect {} {}x{} width {} {}",
                buffer, origin, width, height, line_width, color
            ),
            CanvasCall::Circle { buffer, center, radius, line_width, color } => {
                write!(f, "[{}] circle {} r {} width {} {}", buffer, center, radius, line_width, color)
            }
            CanvasCall::FillRect { buffer, origin, width, height, color } => {
                write!(f, "[{}] fill rect {} {}x{} {}", buffer, origin, width, height, color)
            }
            CanvasCall::FillCircle { buffer, center, radius, color } => {
                write!(f, "[{}] fill circle {} r {} {}", buffer, center, radius, color)
            }
            CanvasCall::Copy { dst, src } => write!(f, "copy [{}] -> [{}]", src, dst),
            CanvasCall::Update => write!(f, "update"),
        }
    }
}

/// A headless canvas that logs every call instead of rasterizing
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    calls: Vec<CanvasCall>,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[CanvasCall] {
        &self.calls
    }

    /// Calls that change pixels or present them
    pub fn drawing_calls(&self) -> Vec<CanvasCall> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, CanvasCall::AllocateBuffers(_) | CanvasCall::ReleaseBuffers))
            .cloned()
            .collect()
    }

    pub fn take_calls(&mut self) -> Vec<CanvasCall> {
        std::mem::take(&mut self.calls)
    }

    /// Change the reported size, as a window resize would
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl Default for RecordingCanvas {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn allocate_buffers(&mut self, count: u32) {
        self.calls.push(CanvasCall::AllocateBuffers(count));
    }

    fn release_buffers(&mut self) {
        self.calls.push(CanvasCall::ReleaseBuffers);
    }

    fn draw_pixel(&mut self, buffer: u32, at: Pixel, color: Rgba) {
        self.calls.push(CanvasCall::Pixel { buffer, at, color });
    }

    fn draw_stroke(&mut self, buffer: u32, from: Pixel, length: u32, color: Rgba) {
        self.calls.push(CanvasCall::Stroke { buffer, from, length, color });
    }

    fn draw_line(&mut self, buffer: u32, from: Pixel, to: Pixel, line_width: f32, color: Rgba) {
        self.calls.push(CanvasCall::Line { buffer, from, to, line_width, color });
    }

    fn draw_rect(&mut self, buffer: u32, origin: Pixel, width: u32, height: u32, line_width: f32, color: Rgba) {
        self.calls.push(CanvasCall::Rect { buffer, origin, width, height, line_width, color });
    }

    fn draw_circle(&mut self, buffer: u32, center: Pixel, radius: f32, line_width: f32, color: Rgba) {
        self.calls.push(CanvasCall::Circle { buffer, center, radius, line_width, color });
    }

    fn fill_rect(&mut self, buffer: u32, origin: Pixel, width: u32, height: u32, color: Rgba) {
        self.calls.push(CanvasCall::FillRect { buffer, origin, width, height, color });
    }

    fn fill_circle(&mut self, buffer: u32, center: Pixel, radius: f32, color: Rgba) {
        self.calls.push(CanvasCall::FillCircle { buffer, center, radius, color });
    }

    fn copy_buffer(&mut self, dst: u32, src: u32) {
        self.calls.push(CanvasCall::Copy { dst, src });
    }

    fn notify_updated(&mut self) {
        self.calls.push(CanvasCall::Update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let mut canvas = RecordingCanvas::new(10, 20);
        canvas.allocate_buffers(2);
        canvas.draw_pixel(0, Pixel::new(1, 2), Rgba::BLACK);
        canvas.copy_buffer(1, 0);
        canvas.notify_updated();

        assert_eq!(canvas.width(), 10);
        assert_eq!(canvas.height(), 20);
        assert_eq!(
            canvas.calls(),
            &[
                CanvasCall::AllocateBuffers(2),
                CanvasCall::Pixel { buffer: 0, at: Pixel::new(1, 2), color: Rgba::BLACK },
                CanvasCall::Copy { dst: 1, src: 0 },
                CanvasCall::Update,
            ]
        );
        assert_eq!(canvas.drawing_calls().len(), 3);
    }

    #[test]
    fn test_take_calls_empties_log() {
        let mut canvas = RecordingCanvas::default();
        canvas.notify_updated();
        assert_eq!(canvas.take_calls(), vec![CanvasCall::Update]);
        assert!(canvas.calls().is_empty());
    }

    #[test]
    fn test_display() {
        let call = CanvasCall::Copy { dst: 2, src: 1 };
        assert_eq!(call.to_string(), "copy [1] -> [2]");
    }
}
