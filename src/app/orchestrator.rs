use super::keyboard_input::KeyboardInputHandler;
use super::types::{ComponentState, RunOptions, ShutdownReason, SourceChoice};
use crate::config::MapeoConfig;
use crate::error::{MapeoError, Result};
use crate::events::{EventBus, MapeoEvent};
use crate::export::{export_to_file, ExportDocument, ExportFormat};
use crate::session::{DetectionScheduler, DetectionSchedulerBuilder};
use crate::source::{CameraSource, FileSource, FrameSource, SourceSlot, SyntheticSource};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Owned handle to the attached source so it can be released on shutdown
pub(super) enum AttachedSource {
    Camera(Arc<CameraSource>),
    File(Arc<FileSource>),
    Synthetic,
}

/// Main application coordinator for a live detection run
pub struct MapeoApp {
    pub(super) config: MapeoConfig,
    pub(super) options: RunOptions,
    pub(super) event_bus: EventBus,
    pub(super) sources: Arc<SourceSlot>,
    pub(super) scheduler: DetectionScheduler,

    pub(super) attached: Option<AttachedSource>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) server_task: Option<JoinHandle<Result<()>>>,
    pub(super) background_tasks: Vec<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl MapeoApp {
    /// Create a new application with the given configuration
    pub fn new(config: MapeoConfig, options: RunOptions) -> Result<Self> {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let sources = Arc::new(SourceSlot::new());
        let scheduler = DetectionSchedulerBuilder::new()
            .detection(config.detection.clone())
            .display(config.display.clone())
            .sources(Arc::clone(&sources))
            .event_bus(event_bus.clone())
            .build()?;
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let keyboard_handler = options.keyboard.then(|| {
            KeyboardInputHandler::new(
                scheduler.clone(),
                event_bus.clone(),
                config.export.clone(),
            )
        });

        Ok(Self {
            config,
            options,
            event_bus,
            sources,
            scheduler,
            attached: None,
            keyboard_handler,
            server_task: None,
            background_tasks: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn scheduler(&self) -> &DetectionScheduler {
        &self.scheduler
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Attach the source described by `choice`, replacing any current one
    pub fn attach_source(&mut self, choice: &SourceChoice) -> Result<()> {
        self.release_source();

        let (attached, source): (AttachedSource, Arc<dyn FrameSource>) = match choice {
            SourceChoice::Camera(device) => {
                let mut camera_config = self.config.camera.clone();
                if device.is_some() {
                    camera_config.device = device.clone();
                }
                let camera = Arc::new(CameraSource::open(&camera_config)?);
                self.event_bus.publish(MapeoEvent::CameraStatusChanged {
                    device: camera.device().to_string(),
                    connected: true,
                    timestamp: SystemTime::now(),
                });
                (AttachedSource::Camera(Arc::clone(&camera)), camera)
            }
            SourceChoice::File { path, mime } => {
                let file = Arc::new(FileSource::open(path, mime.as_deref())?);
                (AttachedSource::File(Arc::clone(&file)), file)
            }
            SourceChoice::Synthetic { width, height } => (
                AttachedSource::Synthetic,
                Arc::new(SyntheticSource::new(*width, *height)),
            ),
        };

        let kind = source.kind();
        self.sources.attach(source);
        self.attached = Some(attached);
        self.event_bus.publish(MapeoEvent::SourceAttached { kind });
        Ok(())
    }

    /// Detach and release the current source. A running session keeps going.
    pub fn release_source(&mut self) {
        let Some(previous) = self.sources.detach() else {
            return;
        };
        self.event_bus.publish(MapeoEvent::SourceDetached {
            kind: previous.kind(),
        });

        match self.attached.take() {
            Some(AttachedSource::Camera(camera)) => {
                camera.stop();
                self.event_bus.publish(MapeoEvent::CameraStatusChanged {
                    device: camera.device().to_string(),
                    connected: false,
                    timestamp: SystemTime::now(),
                });
            }
            Some(AttachedSource::File(file)) => file.stop(),
            Some(AttachedSource::Synthetic) | None => {}
        }
    }

    /// Wait until the attached source has produced a frame
    pub async fn wait_for_frame(&self, limit: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if self.sources.intrinsic_size().is_some() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MapeoError::not_ready(format!(
                    "no frame within {:?}",
                    limit
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Export the latest report into the configured export directory
    pub fn export_report(&self, format: ExportFormat) -> Result<PathBuf> {
        let document =
            ExportDocument::new(self.scheduler.latest_report(), self.scheduler.session_id());
        self.write_export(&document, format)
    }

    pub(super) fn write_export(
        &self,
        document: &ExportDocument,
        format: ExportFormat,
    ) -> Result<PathBuf> {
        export_to_file(
            &self.config.export.path,
            &self.config.export.file_stem,
            document,
            format,
        )
    }

    pub(super) fn warn_unsupported_source(&self) {
        if matches!(self.options.source, SourceChoice::Camera(_) | SourceChoice::File { .. })
            && !cfg!(all(feature = "camera", target_os = "linux"))
        {
            warn!("Built without the camera feature; camera and file sources are unavailable");
        }
    }
}
