use super::{FrameSource, SourceKind};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::time::Instant;

const BACKGROUND: Rgba<u8> = Rgba([24, 24, 27, 255]);
const BLOCK: Rgba<u8> = Rgba([250, 250, 250, 255]);

/// Moving test pattern: a bright block sweeping across a dark background
///
/// Useful for exercising the whole detection loop without a camera.
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    /// Horizontal speed in source pixels per second
    speed: f64,
    started: Instant,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            speed: width as f64 / 4.0,
            started: Instant::now(),
        }
    }

    pub fn with_speed(mut self, pixels_per_second: f64) -> Self {
        self.speed = pixels_per_second;
        self
    }

    /// Render the full-size pattern at `elapsed` seconds
    pub fn render_at(&self, elapsed: f64) -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);

        let block_w = (self.width / 5).max(1);
        let block_h = (self.height / 3).max(1);
        let travel = (self.width - block_w.min(self.width)).max(1) as f64;
        let offset = (elapsed * self.speed) % (2.0 * travel);
        // bounce back and forth
        let x = if offset <= travel { offset } else { 2.0 * travel - offset };
        let y = (self.height - block_h) / 2;

        draw_filled_rect_mut(
            &mut frame,
            Rect::at(x as i32, y as i32).of_size(block_w, block_h),
            BLOCK,
        );
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn draw_frame(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let frame = self.render_at(self.started.elapsed().as_secs_f64());
        Some(super::draw_scaled(&frame, width, height))
    }
}
