use std::path::PathBuf;
use std::time::Duration;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    DurationElapsed,
    Error(String),
}

/// Which media to run detection over
#[derive(Debug, Clone, PartialEq)]
pub enum SourceChoice {
    /// Live camera; the configured device when `None`
    Camera(Option<String>),
    File {
        path: PathBuf,
        mime: Option<String>,
    },
    Synthetic {
        width: u32,
        height: u32,
    },
}

/// Runtime options of a live detection run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: SourceChoice,
    /// Also serve the HTTP stats surface
    pub serve: bool,
    pub keyboard: bool,
    /// Stop on its own after this long
    pub duration: Option<Duration>,
    /// How long to wait for a first frame before detection gives up
    pub frame_wait: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            source: SourceChoice::Synthetic {
                width: 320,
                height: 240,
            },
            serve: false,
            keyboard: false,
            duration: None,
            frame_wait: Duration::from_secs(5),
        }
    }
}
