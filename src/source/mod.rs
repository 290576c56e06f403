//! Frame source providers and the slot holding the attached one

mod camera;
mod file;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod memory;
mod synthetic;
mod validate;

pub use camera::{list_devices, CameraDevice, CameraSource};
pub use file::{decode_clip, FileSource};
pub use memory::MemorySource;
pub use synthetic::SyntheticSource;
pub use validate::{is_video_file, validate_video_file, VIDEO_EXTENSIONS};

use crate::analyzer::FrameSampler;
use crate::frame::PixelSnapshot;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// What kind of media backs a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Camera,
    File,
    Synthetic,
    Memory,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Camera => "camera",
            SourceKind::File => "file",
            SourceKind::Synthetic => "synthetic",
            SourceKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// A live media element that can rasterize its current frame
pub trait FrameSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Native frame size, `None` until the first frame has arrived
    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Draw the current frame scaled to `width` x `height`.
    ///
    /// Returns `None` when the source has nothing to show yet.
    fn draw_frame(&self, width: u32, height: u32) -> Option<RgbaImage>;
}

/// Resize a full frame onto a fresh surface of the requested size
pub(crate) fn draw_scaled(frame: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Holder for the currently attached source
///
/// Detaching or swapping the source never touches a running session; the
/// sampler simply sees no frame until something is attached again.
#[derive(Default)]
pub struct SourceSlot {
    current: RwLock<Option<Arc<dyn FrameSource>>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a source, returning the one it replaced
    pub fn attach(&self, source: Arc<dyn FrameSource>) -> Option<Arc<dyn FrameSource>> {
        info!("Attaching {} source", source.kind());
        self.current.write().replace(source)
    }

    pub fn detach(&self) -> Option<Arc<dyn FrameSource>> {
        let previous = self.current.write().take();
        if let Some(source) = &previous {
            info!("Detached {} source", source.kind());
        }
        previous
    }

    pub fn current(&self) -> Option<Arc<dyn FrameSource>> {
        self.current.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn kind(&self) -> Option<SourceKind> {
        self.current.read().as_ref().map(|s| s.kind())
    }

    pub fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.current.read().as_ref().and_then(|s| s.intrinsic_size())
    }

    /// Sample whatever is attached right now
    pub fn sample(&self, sampler: &FrameSampler) -> Option<PixelSnapshot> {
        let source = self.current()?;
        let snapshot = sampler.sample(source.as_ref());
        if snapshot.is_none() {
            debug!("{} source has no frame to sample", source.kind());
        }
        snapshot
    }
}

impl fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSlot")
            .field("kind", &self.kind())
            .finish()
    }
}
