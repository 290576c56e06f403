use crate::error::{MapeoError, Result};
use crate::frame::PixelSnapshot;
use crate::source::{draw_scaled, FrameSource};
use image::RgbaImage;
use tracing::trace;

/// Reads the current frame of a source back at a reduced resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSampler {
    scale: f64,
}

impl FrameSampler {
    /// `scale` is the fraction of the source size to sample at, in (0, 1]
    pub fn new(scale: f64) -> Result<Self> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(MapeoError::Config(config::ConfigError::Message(format!(
                "Sampling scale must be in (0, 1], got {}",
                scale
            ))));
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// `max(1, floor(w * scale))` by `max(1, floor(h * scale))`
    pub fn reduced_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let reduce = |v: u32| ((v as f64 * self.scale).floor() as u32).max(1);
        (reduce(width), reduce(height))
    }

    /// Snapshot the source's current frame.
    ///
    /// `None` when the source does not know its size yet or has no frame.
    pub fn sample(&self, source: &dyn FrameSource) -> Option<PixelSnapshot> {
        let (width, height) = source.intrinsic_size()?;
        if width == 0 || height == 0 {
            return None;
        }

        let (w, h) = self.reduced_dimensions(width, height);
        let surface = source.draw_frame(w, h)?;
        trace!("Sampled {}x{} frame at {}x{}", width, height, w, h);
        Some(PixelSnapshot::from_image(surface))
    }

    /// Snapshot a decoded frame directly
    pub fn sample_image(&self, frame: &RgbaImage) -> PixelSnapshot {
        let (w, h) = self.reduced_dimensions(frame.width(), frame.height());
        PixelSnapshot::from_image(draw_scaled(frame, w, h))
    }
}
