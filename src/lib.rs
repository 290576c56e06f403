pub mod analyzer;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod frame;
pub mod remote;
pub mod session;
pub mod source;

#[cfg(feature = "server")]
pub mod server;

pub use analyzer::{
    analyze_clip, compose_overlay, ClipAnalysis, ClipSummaryBuilder, Detection, DetectionParams,
    FrameSampler, MotionDetector, MotionHeatmap, OverlaySurface, ProcessingSummary,
};
pub use app::{ComponentState, MapeoApp, RunOptions, ShutdownReason, SourceChoice};
pub use config::MapeoConfig;
pub use error::{MapeoError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, MapeoEvent};
pub use export::{export_to_file, ExportDocument, ExportFormat};
pub use frame::PixelSnapshot;
pub use remote::RemoteProcessor;
pub use session::{DetectionScheduler, DetectionSchedulerBuilder, SessionStatus, StatsReport};
pub use source::{FrameSource, SourceKind, SourceSlot};

#[cfg(feature = "server")]
pub use server::{StatsServer, StatsServerBuilder};
