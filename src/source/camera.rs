use super::{draw_scaled, FrameSource, SourceKind};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::info;

#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::prelude::*;

const DEFAULT_DEVICE: &str = "default";

/// A capture device reported by the system
#[derive(Debug, Clone, Serialize)]
pub struct CameraDevice {
    pub name: String,
    pub class: String,
    pub path: Option<String>,
}

/// Live camera stream decoded to RGBA through GStreamer
///
/// The most recent frame is kept behind a lock and replaced as new samples
/// arrive. The pipeline is torn down by `stop()` or on drop.
pub struct CameraSource {
    device: String,
    latest: Arc<RwLock<Option<RgbaImage>>>,
    #[cfg(all(feature = "camera", target_os = "linux"))]
    pipeline: Mutex<Option<gstreamer::Pipeline>>,
    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    pipeline: Mutex<Option<()>>,
}

impl CameraSource {
    /// Acquire the configured camera and start streaming
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let device = config
            .device
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE.to_string());

        info!("Opening camera {}", device);
        if let Some(path) = &config.device {
            probe_device(path)?;
        }

        let camera = Self {
            device,
            latest: Arc::new(RwLock::new(None)),
            pipeline: Mutex::new(None),
        };
        camera.start_pipeline(config)?;

        info!("Camera {} streaming", camera.device);
        Ok(camera)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_streaming(&self) -> bool {
        self.pipeline.lock().is_some()
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    fn start_pipeline(&self, config: &CameraConfig) -> Result<()> {
        let description = build_pipeline_string(config);
        let (pipeline, appsink) = super::gst::launch(&description)?;

        let latest = Arc::clone(&self.latest);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    match super::gst::sample_to_image(&sample) {
                        Ok((image, _)) => {
                            tracing::trace!("Camera frame {}x{}", image.width(), image.height());
                            *latest.write() = Some(image);
                        }
                        Err(e) => tracing::debug!("Dropping camera sample: {}", e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            super::gst::shutdown(&pipeline);
            return Err(self.unavailable(format!("Failed to start pipeline: {}", e)));
        }

        let (state_change, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(3));
        if state_change.is_err() {
            let details = super::gst::pending_error(&pipeline)
                .unwrap_or_else(|| "pipeline refused to start".to_string());
            super::gst::shutdown(&pipeline);
            return Err(self.unavailable(details));
        }

        *self.pipeline.lock() = Some(pipeline);
        Ok(())
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    fn start_pipeline(&self, _config: &CameraConfig) -> Result<()> {
        Err(self.unavailable("built without camera support".to_string()))
    }

    fn unavailable(&self, details: String) -> crate::error::MapeoError {
        CameraError::DeviceUnavailable {
            device: self.device.clone(),
            details,
        }
        .into()
    }

    /// Release the device. Safe to call more than once.
    pub fn stop(&self) {
        let Some(pipeline) = self.pipeline.lock().take() else {
            return;
        };

        #[cfg(all(feature = "camera", target_os = "linux"))]
        super::gst::shutdown(&pipeline);
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        let _ = pipeline;

        *self.latest.write() = None;
        info!("Camera {} released", self.device);
    }
}

impl FrameSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.latest.read().as_ref().map(|f| f.dimensions())
    }

    fn draw_frame(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let latest = self.latest.read();
        latest.as_ref().map(|f| draw_scaled(f, width, height))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSource")
            .field("device", &self.device)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// Open the device node once so permission problems surface as such
fn probe_device(path: &str) -> Result<()> {
    match std::fs::OpenOptions::new().read(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(CameraError::PermissionDenied {
            device: path.to_string(),
        }
        .into()),
        Err(e) => Err(CameraError::DeviceUnavailable {
            device: path.to_string(),
            details: e.to_string(),
        }
        .into()),
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn build_pipeline_string(config: &CameraConfig) -> String {
    let source = match &config.device {
        Some(device) => format!("v4l2src device={}", device),
        None => "autovideosrc".to_string(),
    };

    let mut caps = "video/x-raw,format=RGBA".to_string();
    if let Some((width, height)) = config.resolution {
        caps.push_str(&format!(",width={},height={}", width, height));
    }
    if let Some(fps) = config.fps {
        caps.push_str(&format!(",framerate={}/1", fps));
    }

    format!(
        "{} ! videoconvert ! videoscale ! videorate ! {} ! \
         appsink name=sink sync=false max-buffers=1 drop=true",
        source, caps
    )
}

/// Enumerate video capture devices
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn list_devices() -> Result<Vec<CameraDevice>> {
    super::gst::init()?;

    let monitor = gstreamer::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    monitor.start().map_err(|e| CameraError::Pipeline {
        details: format!("Failed to start device monitor: {}", e),
    })?;

    let devices = monitor
        .devices()
        .into_iter()
        .map(|device| {
            let path = device.properties().and_then(|props| {
                props
                    .get::<String>("api.v4l2.path")
                    .or_else(|_| props.get::<String>("device.path"))
                    .ok()
            });
            CameraDevice {
                name: device.display_name().to_string(),
                class: device.device_class().to_string(),
                path,
            }
        })
        .collect::<Vec<_>>();

    monitor.stop();
    tracing::debug!("Found {} video devices", devices.len());
    Ok(devices)
}

/// Enumerate video capture devices
#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn list_devices() -> Result<Vec<CameraDevice>> {
    Err(CameraError::DeviceUnavailable {
        device: DEFAULT_DEVICE.to_string(),
        details: "built without camera support".to_string(),
    }
    .into())
}
