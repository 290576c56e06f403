use super::overlay::OverlaySurface;
use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::frame::PixelSnapshot;
use image::Rgba;
use tracing::{debug, trace};

/// Smallest highlight edge in display pixels
const MIN_HIGHLIGHT_EDGE: u32 = 3;

/// Tunables of the frame-difference detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Summed |dR| + |dG| + |dB| a grid point must exceed
    pub threshold: u32,
    /// Grid stride in snapshot pixels
    pub step: u32,
    pub highlight: Rgba<u8>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for DetectionParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.threshold,
            step: config.step.max(1),
            highlight: Rgba(config.highlight_color),
        }
    }
}

/// Single-previous-frame differencing detector
///
/// Walks a sparse grid over two equally sized snapshots and counts the grid
/// points whose colour changed by more than the threshold. No background
/// model is kept between calls.
#[derive(Debug, Clone, Default)]
pub struct MotionDetector {
    params: DetectionParams,
}

impl MotionDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self {
            params: DetectionParams {
                step: params.step.max(1),
                ..params
            },
        }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn update_params(&mut self, params: DetectionParams) {
        debug!("Updating detection parameters: {:?}", params);
        *self = Self::new(params);
    }

    /// Grid coordinates (in snapshot pixels) that registered motion
    pub fn motion_cells(
        &self,
        previous: &PixelSnapshot,
        current: &PixelSnapshot,
    ) -> Result<Vec<(u32, u32)>, DetectionError> {
        if !previous.same_dimensions(current) {
            return Err(DetectionError::DimensionMismatch {
                previous_width: previous.width(),
                previous_height: previous.height(),
                current_width: current.width(),
                current_height: current.height(),
            });
        }

        let step = self.params.step as usize;
        let mut cells = Vec::new();
        for y in (0..current.height()).step_by(step) {
            for x in (0..current.width()).step_by(step) {
                if color_delta(previous.pixel(x, y), current.pixel(x, y)) > self.params.threshold {
                    cells.push((x, y));
                }
            }
        }
        Ok(cells)
    }

    /// Count motion cells and paint one highlight per cell onto `overlay`,
    /// which is resized to the display and cleared first.
    pub fn detect_and_render(
        &self,
        previous: &PixelSnapshot,
        current: &PixelSnapshot,
        overlay: &mut OverlaySurface,
        display_width: u32,
        display_height: u32,
    ) -> Result<u32, DetectionError> {
        let cells = self.motion_cells(previous, current)?;

        overlay.reset(display_width, display_height);

        let scale_x = display_width as f64 / current.width() as f64;
        let scale_y = display_height as f64 / current.height() as f64;
        let step = self.params.step as f64;
        let rect_w = ((step * scale_x).ceil() as u32).max(MIN_HIGHLIGHT_EDGE);
        let rect_h = ((step * scale_y).ceil() as u32).max(MIN_HIGHLIGHT_EDGE);

        for &(x, y) in &cells {
            let left = (x as f64 * scale_x).floor() as i32;
            let top = (y as f64 * scale_y).floor() as i32;
            overlay.highlight(left, top, rect_w, rect_h, self.params.highlight);
        }

        trace!(
            "{} motion cells on a {}x{} grid",
            cells.len(),
            current.width(),
            current.height()
        );
        Ok(cells.len() as u32)
    }
}

/// Alpha is ignored
#[inline]
fn color_delta(a: [u8; 4], b: [u8; 4]) -> u32 {
    a.iter()
        .zip(b.iter())
        .take(3)
        .map(|(&p, &q)| (p as i32 - q as i32).unsigned_abs())
        .sum()
}
