use super::{draw_scaled, validate_video_file, FrameSource, SourceKind};
use crate::error::Result;
use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[cfg(all(feature = "camera", target_os = "linux"))]
use crate::error::CameraError;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::prelude::*;

/// A video file played back in real time
///
/// Playback stops on the last frame at end of stream, which stays samplable.
pub struct FileSource {
    path: PathBuf,
    latest: Arc<RwLock<Option<RgbaImage>>>,
    #[cfg(all(feature = "camera", target_os = "linux"))]
    pipeline: Mutex<Option<gstreamer::Pipeline>>,
    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    pipeline: Mutex<Option<()>>,
}

impl FileSource {
    /// Validate and start playing a video file
    pub fn open<P: AsRef<Path>>(path: P, mime: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        validate_video_file(&path, mime)?;

        info!("Loading video file {}", path.display());
        let source = Self {
            path,
            latest: Arc::new(RwLock::new(None)),
            pipeline: Mutex::new(None),
        };
        source.start_pipeline()?;
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    fn start_pipeline(&self) -> Result<()> {
        let (pipeline, appsink) = super::gst::launch(
            "filesrc name=src ! decodebin ! videoconvert ! video/x-raw,format=RGBA ! \
             appsink name=sink sync=true max-buffers=1 drop=true",
        )?;
        set_location(&pipeline, &self.path)?;

        let latest = Arc::clone(&self.latest);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    if let Ok((image, _)) = super::gst::sample_to_image(&sample) {
                        *latest.write() = Some(image);
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Pipeline {
                details: format!("Failed to play {}: {}", self.path.display(), e),
            })?;

        *self.pipeline.lock() = Some(pipeline);
        Ok(())
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    fn start_pipeline(&self) -> Result<()> {
        Err(crate::error::CameraError::Pipeline {
            details: "built without media decoding support".to_string(),
        }
        .into())
    }

    pub fn stop(&self) {
        let Some(pipeline) = self.pipeline.lock().take() else {
            return;
        };
        #[cfg(all(feature = "camera", target_os = "linux"))]
        super::gst::shutdown(&pipeline);
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        let _ = pipeline;
        info!("Stopped playback of {}", self.path.display());
    }
}

impl FrameSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.latest.read().as_ref().map(|f| f.dimensions())
    }

    fn draw_frame(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let latest = self.latest.read();
        latest.as_ref().map(|f| draw_scaled(f, width, height))
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource").field("path", &self.path).finish()
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn set_location(pipeline: &gstreamer::Pipeline, path: &Path) -> Result<()> {
    let filesrc = pipeline.by_name("src").ok_or_else(|| CameraError::Pipeline {
        details: "Failed to get filesrc element".to_string(),
    })?;
    filesrc.set_property("location", path.to_string_lossy().as_ref());
    Ok(())
}

/// Decode a whole clip as fast as possible, handing every frame to `on_frame`.
///
/// Blocking; returns the clip's nominal frame rate (0 when the container
/// does not declare one).
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn decode_clip<P, F>(path: P, mut on_frame: F) -> Result<f64>
where
    P: AsRef<Path>,
    F: FnMut(RgbaImage),
{
    let path = path.as_ref();
    let (pipeline, appsink) = super::gst::launch(
        "filesrc name=src ! decodebin ! videoconvert ! video/x-raw,format=RGBA ! \
         appsink name=sink sync=false max-buffers=4 drop=false",
    )?;
    set_location(&pipeline, path)?;

    pipeline
        .set_state(gstreamer::State::Playing)
        .map_err(|e| CameraError::Pipeline {
            details: format!("Failed to decode {}: {}", path.display(), e),
        })?;

    let mut fps = 0.0;
    let mut frames = 0u64;
    let outcome = loop {
        if let Some(sample) = appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(500)) {
            match super::gst::sample_to_image(&sample) {
                Ok((image, info)) => {
                    if frames == 0 {
                        let rate = info.fps();
                        if rate.denom() > 0 {
                            fps = rate.numer() as f64 / rate.denom() as f64;
                        }
                    }
                    frames += 1;
                    on_frame(image);
                }
                Err(e) => break Err(e),
            }
            continue;
        }

        if let Some(details) = super::gst::pending_error(&pipeline) {
            break Err(CameraError::Pipeline { details }.into());
        }
        if appsink.is_eos() {
            break Ok(fps);
        }
    };

    super::gst::shutdown(&pipeline);
    tracing::debug!("Decoded {} frames from {}", frames, path.display());
    outcome
}

/// Decode a whole clip as fast as possible, handing every frame to `on_frame`.
#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn decode_clip<P, F>(path: P, _on_frame: F) -> Result<f64>
where
    P: AsRef<Path>,
    F: FnMut(RgbaImage),
{
    Err(crate::error::CameraError::Pipeline {
        details: format!(
            "cannot decode {}: built without media decoding support",
            path.as_ref().display()
        ),
    }
    .into())
}
