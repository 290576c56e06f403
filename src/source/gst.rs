//! GStreamer glue shared by the camera and file sources

use crate::error::{CameraError, Result};
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbaImage;
use std::sync::Once;
use tracing::{debug, warn};

static INIT: Once = Once::new();

pub(super) fn init() -> Result<()> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = gstreamer::init().map_err(|e| CameraError::Pipeline {
            details: format!("Failed to initialize GStreamer: {}", e),
        });
    });
    Ok(outcome?)
}

/// Parse a launch line into a pipeline and fetch its `sink` appsink
pub(super) fn launch(description: &str) -> Result<(Pipeline, AppSink)> {
    init()?;
    debug!("Creating GStreamer pipeline: {}", description);

    let pipeline = gstreamer::parse::launch(description)
        .map_err(|e| CameraError::Pipeline {
            details: format!("Failed to create pipeline: {}", e),
        })?
        .downcast::<Pipeline>()
        .map_err(|_| CameraError::Pipeline {
            details: "Failed to downcast to Pipeline".to_string(),
        })?;

    let appsink = pipeline
        .by_name("sink")
        .ok_or_else(|| CameraError::Pipeline {
            details: "Failed to get appsink element".to_string(),
        })?
        .downcast::<AppSink>()
        .map_err(|_| CameraError::Pipeline {
            details: "Failed to downcast to AppSink".to_string(),
        })?;

    Ok((pipeline, appsink))
}

/// Copy an RGBA sample into a tightly packed image, dropping row padding
pub(super) fn sample_to_image(sample: &gstreamer::Sample) -> Result<(RgbaImage, VideoInfo)> {
    let buffer = sample.buffer().ok_or_else(|| CameraError::Pipeline {
        details: "No buffer in sample".to_string(),
    })?;
    let caps = sample.caps().ok_or_else(|| CameraError::Pipeline {
        details: "No caps in sample".to_string(),
    })?;
    let info = VideoInfo::from_caps(caps).map_err(|e| CameraError::Pipeline {
        details: format!("Failed to get video info: {}", e),
    })?;

    let map = buffer.map_readable().map_err(|e| CameraError::Pipeline {
        details: format!("Failed to map buffer: {}", e),
    })?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 4;
    let stride = info.stride()[0].max(0) as usize;
    let bytes = map.as_slice();

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let Some(line) = bytes.get(start..start + row_bytes) else {
            return Err(CameraError::Pipeline {
                details: format!("Short RGBA buffer at row {}", row),
            }
            .into());
        };
        packed.extend_from_slice(line);
    }

    let image = RgbaImage::from_raw(width, height, packed).ok_or_else(|| CameraError::Pipeline {
        details: "RGBA buffer does not match frame size".to_string(),
    })?;

    Ok((image, info))
}

/// Tear a pipeline down to Null, logging rather than failing
pub(super) fn shutdown(pipeline: &Pipeline) {
    if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
        warn!("Failed to stop GStreamer pipeline: {}", e);
    }
}

/// Pop the first pending error off the pipeline bus, if any
pub(super) fn pending_error(pipeline: &Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let message = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
    match message.view() {
        gstreamer::MessageView::Error(err) => Some(format!(
            "{} ({})",
            err.error(),
            err.debug().map(|d| d.to_string()).unwrap_or_default()
        )),
        _ => None,
    }
}
