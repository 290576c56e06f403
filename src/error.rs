use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapeoError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Not ready: {reason}")]
    NotReady { reason: String },

    #[error("Invalid input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Remote processing error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Camera acquisition and pipeline failures
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Permission denied opening camera {device}")]
    PermissionDenied { device: String },

    #[error("Camera {device} is unavailable: {details}")]
    DeviceUnavailable { device: String, details: String },

    #[error("Media pipeline error: {details}")]
    Pipeline { details: String },
}

/// Failures reported by the remote processing endpoint
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Server answered with status {code}")]
    Status { code: u16 },

    #[error("Upload failed: {details}")]
    Transport { details: String },

    #[error("Could not decode server response: {details}")]
    Decode { details: String },
}

/// Invariant violations inside the motion detector
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectionError {
    #[error(
        "Snapshot size mismatch: previous is {previous_width}x{previous_height}, current is {current_width}x{current_height}"
    )]
    DimensionMismatch {
        previous_width: u32,
        previous_height: u32,
        current_width: u32,
        current_height: u32,
    },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {missed} events")]
    Lagged { missed: u64 },

    #[error("Event bus closed")]
    ChannelClosed,
}

impl MapeoError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn not_ready<S: Into<String>>(reason: S) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(name: S, reason: S) -> Self {
        Self::InvalidInput {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Errors a user can act on; these become notices instead of aborting anything.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MapeoError::NotReady { .. }
                | MapeoError::InvalidInput { .. }
                | MapeoError::Camera(_)
                | MapeoError::Remote(_)
        )
    }

    /// Short user-facing text for a notice
    pub fn notice_text(&self) -> String {
        match self {
            MapeoError::NotReady { .. } => "Video/camera not available for sampling".to_string(),
            MapeoError::InvalidInput { name, .. } => {
                format!("Invalid file '{}': select only video files", name)
            }
            MapeoError::Camera(CameraError::PermissionDenied { .. }) => {
                "Could not access the camera (permission denied)".to_string()
            }
            MapeoError::Camera(_) => "Could not access the camera".to_string(),
            MapeoError::Remote(RemoteError::Status { code }) => {
                format!("Server error: {}", code)
            }
            MapeoError::Remote(_) => "Upload failed".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapeoError>;
