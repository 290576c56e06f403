use crate::frame::PixelSnapshot;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Externally visible detection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    /// Only produced for processed clips
    Done,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Done => "done",
        };
        f.write_str(name)
    }
}

/// Snapshot of the running counters, as handed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub frames_processed: u64,
    pub last_motion_count: u32,
    pub total_detections: u64,
    pub frames_with_detections: u64,
    pub fps: f64,
    pub status: SessionStatus,
}

/// Counters and comparison state of one detection session
///
/// Only the detection cycle mutates a running session.
#[derive(Debug, Default)]
pub struct DetectionSession {
    id: Option<Uuid>,
    previous: Option<PixelSnapshot>,
    frames_processed: u64,
    total_motion: u64,
    frames_with_motion: u64,
    last_motion: u32,
    started_at: Option<Instant>,
    active: bool,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero everything and start a fresh session seeded with `seed`
    pub fn begin(&mut self, seed: PixelSnapshot) -> Uuid {
        let id = Uuid::new_v4();
        *self = Self {
            id: Some(id),
            previous: Some(seed),
            started_at: Some(Instant::now()),
            active: true,
            ..Self::default()
        };
        id
    }

    /// Fold one compared frame into the counters
    pub fn record_cycle(&mut self, motion: u32) {
        self.frames_processed += 1;
        self.total_motion += motion as u64;
        if motion > 0 {
            self.frames_with_motion += 1;
        }
        self.last_motion = motion;
    }

    pub fn take_previous(&mut self) -> Option<PixelSnapshot> {
        self.previous.take()
    }

    pub fn set_previous(&mut self, snapshot: Option<PixelSnapshot>) {
        self.previous = snapshot;
    }

    pub fn previous(&self) -> Option<&PixelSnapshot> {
        self.previous.as_ref()
    }

    /// Deactivate: drops the comparison frame, start instant and last motion.
    /// Cumulative counters stay readable until the next `begin`.
    pub fn end(&mut self) {
        self.active = false;
        self.previous = None;
        self.started_at = None;
        self.last_motion = 0;
        self.id = None;
    }

    pub fn is_current(&self, id: Uuid) -> bool {
        self.active && self.id == Some(id)
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn total_motion(&self) -> u64 {
        self.total_motion
    }

    pub fn frames_with_motion(&self) -> u64 {
        self.frames_with_motion
    }

    pub fn status(&self) -> SessionStatus {
        if self.active {
            SessionStatus::Running
        } else {
            SessionStatus::Idle
        }
    }

    /// Derive a report; fps is frames over seconds since start
    pub fn report(&self, now: Instant) -> StatsReport {
        let fps = match self.started_at {
            Some(start) => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                if elapsed > 0.0 {
                    self.frames_processed as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        StatsReport {
            frames_processed: self.frames_processed,
            last_motion_count: self.last_motion,
            total_detections: self.total_motion,
            frames_with_detections: self.frames_with_motion,
            fps,
            status: self.status(),
        }
    }
}
