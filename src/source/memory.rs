use super::{draw_scaled, FrameSource, SourceKind};
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Source fed programmatically, one frame per draw
///
/// Each draw advances to the next queued frame; the last frame stays on
/// screen once the queue runs dry, like a paused video.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: Mutex<VecDeque<RgbaImage>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames<I: IntoIterator<Item = RgbaImage>>(frames: I) -> Self {
        Self {
            frames: Mutex::new(frames.into_iter().collect()),
        }
    }

    pub fn push(&self, frame: RgbaImage) {
        self.frames.lock().push_back(frame);
    }

    pub fn queued(&self) -> usize {
        self.frames.lock().len()
    }
}

impl FrameSource for MemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.frames.lock().front().map(|f| f.dimensions())
    }

    fn draw_frame(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let mut frames = self.frames.lock();
        let frame = if frames.len() > 1 {
            frames.pop_front()?
        } else {
            frames.front()?.clone()
        };
        Some(draw_scaled(&frame, width, height))
    }
}
