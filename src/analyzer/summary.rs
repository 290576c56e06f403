use super::heatmap::MotionHeatmap;
use super::motion::{DetectionParams, MotionDetector};
use super::sampler::FrameSampler;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::frame::PixelSnapshot;
use crate::session::SessionStatus;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Aggregate statistics over a whole processed clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub duration_seconds: f64,
    pub total_detections: u64,
    pub frames_with_detections: u64,
    pub average_motion_per_frame: f64,
    pub average_motion_when_active: f64,
    pub peak_motion_in_single_frame: u32,
    /// Total motion cells divided by the frame rate
    #[serde(default)]
    pub estimated_motion_seconds: f64,
    /// Motion cells summed per second of video
    pub motion_per_second: Vec<u64>,
    pub status: SessionStatus,
}

/// One motion cell of one frame, in source-frame pixels
///
/// `frame_idx` counts decoded frames from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub frame_idx: u64,
    pub x: u32,
    pub y: u32,
}

/// Everything learned from one clip
#[derive(Debug, Clone)]
pub struct ClipAnalysis {
    pub summary: ProcessingSummary,
    pub detections: Vec<Detection>,
    /// `None` when nothing moved
    pub heatmap: Option<MotionHeatmap>,
}

/// Runs the detector over consecutive decoded frames of a clip
///
/// The first frame only seeds the comparison and counts as zero motion.
#[derive(Debug)]
pub struct ClipSummaryBuilder {
    sampler: FrameSampler,
    detector: MotionDetector,
    previous: Option<PixelSnapshot>,
    per_frame: Vec<u32>,
    detections: Vec<Detection>,
    heatmap: Option<MotionHeatmap>,
    frame_size: Option<(u32, u32)>,
}

impl ClipSummaryBuilder {
    pub fn new(sampler: FrameSampler, detector: MotionDetector) -> Self {
        Self {
            sampler,
            detector,
            previous: None,
            per_frame: Vec::new(),
            detections: Vec::new(),
            heatmap: None,
            frame_size: None,
        }
    }

    /// Feed the next decoded frame
    pub fn push_frame(&mut self, frame: &RgbaImage) {
        self.frame_size = Some(frame.dimensions());
        let snapshot = self.sampler.sample_image(frame);
        self.push_snapshot(snapshot);
    }

    pub fn push_snapshot(&mut self, current: PixelSnapshot) {
        let motion = match self.previous.take() {
            Some(previous) => match self.detector.motion_cells(&previous, &current) {
                Ok(cells) => {
                    self.record_cells(&current, &cells);
                    cells.len() as u32
                }
                Err(e) => {
                    // resolution change mid-clip; restart the comparison
                    warn!("Skipping frame {}: {}", self.per_frame.len(), e);
                    0
                }
            },
            None => 0,
        };
        self.per_frame.push(motion);
        self.previous = Some(current);
    }

    fn record_cells(&mut self, current: &PixelSnapshot, cells: &[(u32, u32)]) {
        if cells.is_empty() {
            return;
        }

        let frame_idx = self.per_frame.len() as u64 + 1;
        let (grid_w, grid_h) = current.dimensions();
        let (frame_w, frame_h) = self.frame_size.unwrap_or((grid_w, grid_h));
        self.detections.extend(cells.iter().map(|&(x, y)| Detection {
            frame_idx,
            x: (x as u64 * frame_w as u64 / grid_w as u64) as u32,
            y: (y as u64 * frame_h as u64 / grid_h as u64) as u32,
        }));

        let step = self.detector.params().step;
        let heatmap = self
            .heatmap
            .get_or_insert_with(|| MotionHeatmap::new(grid_w, grid_h, step));
        heatmap.add_cells(cells);
    }

    pub fn frames(&self) -> usize {
        self.per_frame.len()
    }

    pub fn finish(self, fps: f64) -> ClipAnalysis {
        let total_frames = self.per_frame.len() as u64;
        let total_detections: u64 = self.per_frame.iter().map(|&m| m as u64).sum();
        let frames_with_detections = self.per_frame.iter().filter(|&&m| m > 0).count() as u64;
        let peak = self.per_frame.iter().copied().max().unwrap_or(0);

        let average_motion_per_frame = if total_frames > 0 {
            total_detections as f64 / total_frames as f64
        } else {
            0.0
        };
        let average_motion_when_active = if frames_with_detections > 0 {
            total_detections as f64 / frames_with_detections as f64
        } else {
            0.0
        };
        let duration_seconds = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        let estimated_motion_seconds = if fps > 0.0 {
            total_detections as f64 / fps
        } else {
            0.0
        };

        let seconds = duration_seconds.ceil() as usize;
        let mut motion_per_second = vec![0u64; seconds];
        if fps > 0.0 {
            for (index, &motion) in self.per_frame.iter().enumerate() {
                let second = (index as f64 / fps) as usize;
                if let Some(slot) = motion_per_second.get_mut(second) {
                    *slot += motion as u64;
                }
            }
        }

        debug!(
            "Clip summary: {} frames, {} detections, peak {}",
            total_frames, total_detections, peak
        );

        let frame_size = self.frame_size;
        let heatmap = self
            .heatmap
            .filter(|heatmap| !heatmap.is_empty())
            .map(|heatmap| match frame_size {
                Some((width, height)) => heatmap.with_output_size(width, height),
                None => heatmap,
            });

        ClipAnalysis {
            summary: ProcessingSummary {
                total_frames,
                fps,
                duration_seconds,
                total_detections,
                frames_with_detections,
                average_motion_per_frame,
                average_motion_when_active,
                peak_motion_in_single_frame: peak,
                estimated_motion_seconds,
                motion_per_second,
                status: SessionStatus::Done,
            },
            detections: self.detections,
            heatmap,
        }
    }
}

/// Decode a clip and analyze motion over all its frames. Blocking.
pub fn analyze_clip<P: AsRef<Path>>(path: P, config: &DetectionConfig) -> Result<ClipAnalysis> {
    let sampler = FrameSampler::new(config.scale)?;
    let detector = MotionDetector::new(DetectionParams::from(config));
    let mut builder = ClipSummaryBuilder::new(sampler, detector);

    let fps = crate::source::decode_clip(path, |frame| builder.push_frame(&frame))?;
    Ok(builder.finish(fps))
}
