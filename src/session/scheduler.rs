use super::state::{DetectionSession, SessionStatus, StatsReport};
use crate::analyzer::{DetectionParams, FrameSampler, MotionDetector, OverlaySurface};
use crate::config::{DetectionConfig, DisplayConfig};
use crate::error::{MapeoError, Result};
use crate::events::{EventBus, MapeoEvent};
use crate::frame::PixelSnapshot;
use crate::source::SourceSlot;
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Used when a zero rate slips through
const FALLBACK_FPS: u32 = 5;
/// Re-arm floor in milliseconds
const MIN_CYCLE_DELAY_MS: u64 = 10;

fn interval_ms(target_fps: u32) -> u64 {
    let fps = if target_fps == 0 {
        FALLBACK_FPS
    } else {
        target_fps
    };
    (1000.0 / fps as f64).round() as u64
}

/// Delay before the first cycle of a session
pub fn first_cycle_delay(target_fps: u32) -> Duration {
    Duration::from_millis(interval_ms(target_fps))
}

/// Delay between consecutive cycles, never below 10 ms
pub fn cycle_delay(target_fps: u32) -> Duration {
    Duration::from_millis(interval_ms(target_fps).max(MIN_CYCLE_DELAY_MS))
}

/// Handle to the pending detection cycle
///
/// The task sleeps, runs one cycle, and re-arms itself with the delay the
/// cycle hands back, until cancelled or the session goes away.
struct ScheduledCycle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledCycle {
    fn spawn(
        runtime: &Handle,
        shared: Weak<SchedulerShared>,
        session_id: Uuid,
        first_delay: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = runtime.spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let Some(shared) = shared.upgrade() else {
                    break;
                };
                match shared.run_cycle(session_id) {
                    Some(next) => delay = next,
                    None => break,
                }
            }
            debug!("Detection cycle task for session {} finished", session_id);
        });

        Self { token, handle }
    }

    /// Idempotent
    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledCycle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct SchedulerState {
    session: DetectionSession,
    sampler: FrameSampler,
    detector: MotionDetector,
    overlay: OverlaySurface,
    target_fps: u32,
    display_size: Option<(u32, u32)>,
    pending: Option<ScheduledCycle>,
}

impl SchedulerState {
    /// Configured display size, else the source's own size, else the snapshot's
    fn display_dimensions(
        &self,
        current: &PixelSnapshot,
        intrinsic: Option<(u32, u32)>,
    ) -> (u32, u32) {
        self.display_size
            .or(intrinsic)
            .filter(|&(w, h)| w > 0 && h > 0)
            .unwrap_or_else(|| current.dimensions())
    }

    /// Cancel the pending cycle and return to idle
    fn halt(&mut self) -> StatsReport {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.overlay.clear();
        self.session.end();
        self.session.report(Instant::now())
    }
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    sources: Arc<SourceSlot>,
    stats: watch::Sender<StatsReport>,
    event_bus: EventBus,
}

impl SchedulerShared {
    /// One sample-compare-render step. Returns the delay to re-arm with, or
    /// `None` when the session this task belongs to is over.
    fn run_cycle(&self, session_id: Uuid) -> Option<Duration> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.session.is_current(session_id) {
            return None;
        }

        let current = self.sources.sample(&state.sampler);
        let previous = state.session.take_previous();

        match (previous, current) {
            (Some(previous), Some(current)) if !previous.same_dimensions(&current) => {
                debug!(
                    "Source size changed from {:?} to {:?}; reseeding",
                    previous.dimensions(),
                    current.dimensions()
                );
                state.session.set_previous(Some(current));
            }
            (Some(previous), Some(current)) => {
                let (display_w, display_h) =
                    state.display_dimensions(&current, self.sources.intrinsic_size());

                match state.detector.detect_and_render(
                    &previous,
                    &current,
                    &mut state.overlay,
                    display_w,
                    display_h,
                ) {
                    Ok(motion) => {
                        state.session.record_cycle(motion);
                        state.session.set_previous(Some(current));
                        let report = state.session.report(Instant::now());
                        debug!(
                            "Cycle {}: {} motion cells ({} total)",
                            report.frames_processed, motion, report.total_detections
                        );
                        self.stats.send_replace(report);
                    }
                    Err(e) => {
                        error!("Aborting detection session {}: {}", session_id, e);
                        let report = state.halt();
                        drop(guard);

                        self.stats.send_replace(report);
                        self.event_bus.publish(MapeoEvent::SystemError {
                            component: "detector".to_string(),
                            error: MapeoError::from(e).to_string(),
                        });
                        return None;
                    }
                }
            }
            (_, current) => state.session.set_previous(current),
        }

        Some(cycle_delay(state.target_fps))
    }
}

/// Drives detection cycles over whatever source is attached
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct DetectionScheduler {
    shared: Arc<SchedulerShared>,
}

impl DetectionScheduler {
    pub fn new(
        detection: &DetectionConfig,
        display: &DisplayConfig,
        sources: Arc<SourceSlot>,
        event_bus: EventBus,
    ) -> Result<Self> {
        if detection.target_fps == 0 {
            return Err(zero_fps_error());
        }

        let sampler = FrameSampler::new(detection.scale)?;
        let detector = MotionDetector::new(DetectionParams::from(detection));
        let (stats, _) = watch::channel(StatsReport::default());

        info!(
            "Detection scheduler ready: {} fps, threshold {}, step {}, scale {}",
            detection.target_fps, detection.threshold, detection.step, detection.scale
        );

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState {
                    session: DetectionSession::new(),
                    sampler,
                    detector,
                    overlay: OverlaySurface::default(),
                    target_fps: detection.target_fps,
                    display_size: display.resolution,
                    pending: None,
                }),
                sources,
                stats,
                event_bus,
            }),
        })
    }

    /// Begin a session. Fails with `NotReady` when nothing can be sampled
    /// and with a system error outside a tokio runtime; starting a running
    /// scheduler does nothing.
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.session.is_active() {
            debug!("Detection already running");
            return Ok(());
        }

        // Must be checked before the session is marked active
        let runtime = Handle::try_current().map_err(|e| {
            MapeoError::system(format!("detection cycles need a tokio runtime: {}", e))
        })?;

        let seed = self
            .shared
            .sources
            .sample(&state.sampler)
            .ok_or_else(|| MapeoError::not_ready("no frame available to sample"))?;

        let session_id = state.session.begin(seed);
        let target_fps = state.target_fps;
        state.pending = Some(ScheduledCycle::spawn(
            &runtime,
            Arc::downgrade(&self.shared),
            session_id,
            first_cycle_delay(target_fps),
        ));
        let report = state.session.report(Instant::now());
        drop(state);

        self.shared.stats.send_replace(report);
        self.shared.event_bus.publish(MapeoEvent::DetectionStarted {
            session_id,
            target_fps,
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    /// End the session (if any) and publish the idle report
    pub fn stop(&self) -> StatsReport {
        let mut state = self.shared.state.lock();
        let session_id = state.session.id();
        let was_active = state.session.is_active();
        let report = state.halt();
        drop(state);

        self.shared.stats.send_replace(report.clone());
        if was_active {
            self.shared.event_bus.publish(MapeoEvent::DetectionStopped {
                session_id,
                frames_processed: report.frames_processed,
                total_detections: report.total_detections,
                timestamp: SystemTime::now(),
            });
        }
        report
    }

    /// Flip between running and idle
    pub fn toggle(&self) -> Result<SessionStatus> {
        if self.is_running() {
            self.stop();
            Ok(SessionStatus::Idle)
        } else {
            self.start()?;
            Ok(SessionStatus::Running)
        }
    }

    /// Applies from the next re-arm on
    pub fn set_target_fps(&self, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(zero_fps_error());
        }
        self.shared.state.lock().target_fps = fps;
        debug!("Target fps set to {}", fps);
        Ok(())
    }

    pub fn target_fps(&self) -> u32 {
        self.shared.state.lock().target_fps
    }

    pub fn detection_params(&self) -> DetectionParams {
        *self.shared.state.lock().detector.params()
    }

    /// Applies from the next cycle on
    pub fn update_params(&self, params: DetectionParams) {
        self.shared.state.lock().detector.update_params(params);
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsReport> {
        self.shared.stats.subscribe()
    }

    pub fn latest_report(&self) -> StatsReport {
        self.shared.stats.borrow().clone()
    }

    pub fn overlay_snapshot(&self) -> RgbaImage {
        self.shared.state.lock().overlay.as_image().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.state.lock().session.status()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().session.is_active()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.state.lock().session.id()
    }

    pub fn session_started_at(&self) -> Option<Instant> {
        self.shared.state.lock().session.started_at()
    }

    /// Whether a cycle task is armed and alive
    pub fn has_pending_cycle(&self) -> bool {
        self.shared
            .state
            .lock()
            .pending
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    pub fn sources(&self) -> Arc<SourceSlot> {
        Arc::clone(&self.shared.sources)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.event_bus
    }
}

impl std::fmt::Debug for DetectionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionScheduler")
            .field("status", &self.status())
            .field("target_fps", &self.target_fps())
            .finish()
    }
}

fn zero_fps_error() -> MapeoError {
    MapeoError::Config(config::ConfigError::Message(
        "target fps must be greater than 0".to_string(),
    ))
}

/// Builder for the detection scheduler
pub struct DetectionSchedulerBuilder {
    detection: Option<DetectionConfig>,
    display: DisplayConfig,
    sources: Option<Arc<SourceSlot>>,
    event_bus: Option<EventBus>,
}

impl DetectionSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            detection: None,
            display: DisplayConfig::default(),
            sources: None,
            event_bus: None,
        }
    }

    pub fn detection(mut self, config: DetectionConfig) -> Self {
        self.detection = Some(config);
        self
    }

    pub fn display(mut self, config: DisplayConfig) -> Self {
        self.display = config;
        self
    }

    pub fn sources(mut self, sources: Arc<SourceSlot>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<DetectionScheduler> {
        let detection = self
            .detection
            .ok_or_else(|| MapeoError::system("Detection configuration must be specified"))?;
        let event_bus = self
            .event_bus
            .ok_or_else(|| MapeoError::system("Event bus must be specified"))?;
        let sources = self.sources.unwrap_or_default();

        DetectionScheduler::new(&detection, &self.display, sources, event_bus)
    }
}

impl Default for DetectionSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
