mod heatmap;
mod motion;
mod overlay;
mod sampler;
mod summary;
#[cfg(test)]
mod tests;

pub use heatmap::MotionHeatmap;
pub use motion::{DetectionParams, MotionDetector};
pub use overlay::{compose_overlay, OverlaySurface};
pub use sampler::FrameSampler;
pub use summary::{analyze_clip, ClipAnalysis, ClipSummaryBuilder, Detection, ProcessingSummary};
