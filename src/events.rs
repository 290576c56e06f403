use crate::error::{EventBusError, MapeoError};
use crate::source::SourceKind;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle events and user notices
#[derive(Debug, Clone, Serialize)]
pub enum MapeoEvent {
    /// A detection session began sampling
    DetectionStarted {
        session_id: Uuid,
        target_fps: u32,
        timestamp: SystemTime,
    },
    /// A detection session ended
    DetectionStopped {
        session_id: Option<Uuid>,
        frames_processed: u64,
        total_detections: u64,
        timestamp: SystemTime,
    },
    SourceAttached { kind: SourceKind },
    SourceDetached { kind: SourceKind },
    /// Camera acquisition state changed
    CameraStatusChanged {
        device: String,
        connected: bool,
        timestamp: SystemTime,
    },
    /// Recoverable condition the user should see
    Notice { message: String },
    /// A component failed in a way that needs attention
    SystemError { component: String, error: String },
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl MapeoEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MapeoEvent::DetectionStarted {
                session_id,
                target_fps,
                ..
            } => format!("Detection {} started at {} fps", session_id, target_fps),
            MapeoEvent::DetectionStopped {
                frames_processed,
                total_detections,
                ..
            } => format!(
                "Detection stopped after {} frames ({} detections)",
                frames_processed, total_detections
            ),
            MapeoEvent::SourceAttached { kind } => format!("{} source attached", kind),
            MapeoEvent::SourceDetached { kind } => format!("{} source detached", kind),
            MapeoEvent::CameraStatusChanged {
                device, connected, ..
            } => format!(
                "Camera {} {}",
                device,
                if *connected { "connected" } else { "released" }
            ),
            MapeoEvent::Notice { message } => message.clone(),
            MapeoEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            MapeoEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MapeoEvent::DetectionStarted { .. } => "detection_started",
            MapeoEvent::DetectionStopped { .. } => "detection_stopped",
            MapeoEvent::SourceAttached { .. } => "source_attached",
            MapeoEvent::SourceDetached { .. } => "source_detached",
            MapeoEvent::CameraStatusChanged { .. } => "camera_status_changed",
            MapeoEvent::Notice { .. } => "notice",
            MapeoEvent::SystemError { .. } => "system_error",
            MapeoEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using a broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MapeoEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapeoEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns how many subscribers received it.
    ///
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: MapeoEvent) -> usize {
        match &event {
            MapeoEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            MapeoEvent::Notice { message } => warn!("{}", message),
            MapeoEvent::DetectionStarted { .. }
            | MapeoEvent::DetectionStopped { .. }
            | MapeoEvent::ShutdownRequested { .. } => info!("{}", event.description()),
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Surface an error to the user as a notice
    pub fn notify_error(&self, err: &MapeoError) -> usize {
        if err.is_recoverable() {
            self.publish(MapeoEvent::Notice {
                message: err.notice_text(),
            })
        } else {
            self.publish(MapeoEvent::SystemError {
                component: "mapeo".to_string(),
                error: err.to_string(),
            })
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &MapeoEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<MapeoEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<MapeoEvent>, filter: EventFilter, name: &str) -> Self {
        Self {
            receiver,
            filter,
            name: name.to_string(),
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<MapeoEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, missed);
                    return Err(EventBusError::Lagged { missed });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
