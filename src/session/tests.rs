use super::*;
use crate::config::{DetectionConfig, DisplayConfig};
use crate::error::MapeoError;
use crate::events::{EventBus, MapeoEvent};
use crate::frame::PixelSnapshot;
use crate::source::{MemorySource, SourceSlot};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const DARK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BRIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn detection_config(target_fps: u32) -> DetectionConfig {
    DetectionConfig {
        target_fps,
        scale: 1.0,
        ..DetectionConfig::default()
    }
}

fn frame(size: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(size, size, color)
}

fn scheduler_with(frames: Vec<RgbaImage>, target_fps: u32) -> (DetectionScheduler, Arc<SourceSlot>) {
    let sources = Arc::new(SourceSlot::new());
    if !frames.is_empty() {
        sources.attach(Arc::new(MemorySource::with_frames(frames)));
    }
    let scheduler = DetectionSchedulerBuilder::new()
        .detection(detection_config(target_fps))
        .sources(Arc::clone(&sources))
        .event_bus(EventBus::new(32))
        .build()
        .unwrap();
    (scheduler, sources)
}

#[test]
fn test_session_counters_accumulate() {
    let mut session = DetectionSession::new();
    session.begin(PixelSnapshot::filled(2, 2, [0, 0, 0, 255]));

    for motion in [0, 5, 0, 3, 7] {
        session.record_cycle(motion);
    }

    let report = session.report(Instant::now());
    assert_eq!(report.frames_processed, 5);
    assert_eq!(report.total_detections, 15);
    assert_eq!(report.frames_with_detections, 3);
    assert_eq!(report.last_motion_count, 7);
    assert_eq!(report.status, SessionStatus::Running);
}

#[test]
fn test_report_without_start_has_zero_fps() {
    let session = DetectionSession::new();
    let report = session.report(Instant::now());
    assert_eq!(report.fps, 0.0);
    assert_eq!(report.status, SessionStatus::Idle);
}

#[test]
fn test_stats_report_uses_camel_case_keys() {
    let report = StatsReport {
        frames_processed: 3,
        last_motion_count: 1,
        total_detections: 4,
        frames_with_detections: 2,
        fps: 1.5,
        status: SessionStatus::Running,
    };
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["framesProcessed"], 3);
    assert_eq!(json["lastMotionCount"], 1);
    assert_eq!(json["totalDetections"], 4);
    assert_eq!(json["framesWithDetections"], 2);
    assert_eq!(json["status"], "running");
}

#[test]
fn test_cycle_delays() {
    assert_eq!(first_cycle_delay(5), Duration::from_millis(200));
    assert_eq!(cycle_delay(5), Duration::from_millis(200));
    assert_eq!(cycle_delay(3), Duration::from_millis(333));
    assert_eq!(first_cycle_delay(1000), Duration::from_millis(1));
    assert_eq!(cycle_delay(1000), Duration::from_millis(10));
    assert_eq!(cycle_delay(0), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_start_without_frame_is_not_ready() {
    let (scheduler, _sources) = scheduler_with(Vec::new(), 5);

    let err = scheduler.start().unwrap_err();
    assert!(matches!(err, MapeoError::NotReady { .. }));
    assert_eq!(scheduler.status(), SessionStatus::Idle);
    assert!(!scheduler.has_pending_cycle());
    assert!(scheduler.session_started_at().is_none());
}

#[test]
fn test_start_outside_runtime_leaves_session_idle() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK), frame(8, BRIGHT)], 5);

    let err = scheduler.start().unwrap_err();
    assert!(matches!(err, MapeoError::System { .. }));
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.status(), SessionStatus::Idle);
    assert!(!scheduler.has_pending_cycle());
    assert!(scheduler.session_started_at().is_none());
    assert!(scheduler.session_id().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_param_update_applies_to_next_cycle() {
    let frames = vec![frame(8, DARK), frame(8, BRIGHT), frame(8, DARK)];
    let (scheduler, _sources) = scheduler_with(frames, 5);

    // a full black/white swing sums to 765, which is not strictly above
    let mut params = scheduler.detection_params();
    params.threshold = 765;
    scheduler.update_params(params);
    assert_eq!(scheduler.detection_params().threshold, 765);

    scheduler.start().unwrap();
    sleep(Duration::from_millis(450)).await;
    let report = scheduler.latest_report();
    assert_eq!(report.frames_processed, 2);
    assert_eq!(report.total_detections, 0);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_cycles_accumulate_motion() {
    // motion per cycle: 4, 0, 4, then the last frame repeats
    let frames = vec![
        frame(8, DARK),
        frame(8, BRIGHT),
        frame(8, BRIGHT),
        frame(8, DARK),
    ];
    let (scheduler, _sources) = scheduler_with(frames, 5);

    scheduler.start().unwrap();
    assert_eq!(scheduler.status(), SessionStatus::Running);
    assert!(scheduler.has_pending_cycle());

    sleep(Duration::from_millis(650)).await;

    let report = scheduler.latest_report();
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.total_detections, 8);
    assert_eq!(report.frames_with_detections, 2);
    assert_eq!(report.last_motion_count, 4);
    assert_eq!(report.status, SessionStatus::Running);
    assert!(report.fps > 0.0);

    sleep(Duration::from_millis(400)).await;
    let report = scheduler.latest_report();
    assert_eq!(report.frames_processed, 5);
    assert_eq!(report.total_detections, 8);
    assert_eq!(report.last_motion_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_waits_one_interval() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK), frame(8, BRIGHT)], 5);
    scheduler.start().unwrap();

    sleep(Duration::from_millis(150)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 0);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_overlay_and_reports_idle() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK), frame(8, BRIGHT)], 5);
    let mut stats = scheduler.subscribe();

    scheduler.start().unwrap();
    sleep(Duration::from_millis(250)).await;
    assert!(scheduler.overlay_snapshot().pixels().any(|p| p.0[3] != 0));

    let report = scheduler.stop();
    assert_eq!(report.last_motion_count, 0);
    assert_eq!(report.status, SessionStatus::Idle);
    assert_eq!(report.fps, 0.0);
    assert!(scheduler.overlay_snapshot().pixels().all(|p| p.0[3] == 0));
    assert!(!scheduler.has_pending_cycle());
    assert!(scheduler.session_started_at().is_none());

    assert!(stats.has_changed().unwrap());
    assert_eq!(stats.borrow_and_update().status, SessionStatus::Idle);

    // no cycle runs after stop
    let frames = report.frames_processed;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.latest_report().frames_processed, frames);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_idle_still_publishes() {
    let (scheduler, _sources) = scheduler_with(Vec::new(), 5);
    let mut stats = scheduler.subscribe();

    let report = scheduler.stop();
    assert_eq!(report.status, SessionStatus::Idle);
    assert!(stats.has_changed().unwrap());
    assert_eq!(stats.borrow_and_update().last_motion_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_zeroes_counters() {
    let frames = vec![frame(8, DARK), frame(8, BRIGHT), frame(8, DARK)];
    let (scheduler, _sources) = scheduler_with(frames, 5);

    scheduler.start().unwrap();
    let first_start = scheduler.session_started_at().unwrap();
    let first_id = scheduler.session_id().unwrap();
    sleep(Duration::from_millis(450)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 2);
    scheduler.stop();

    sleep(Duration::from_millis(100)).await;
    scheduler.start().unwrap();

    let report = scheduler.latest_report();
    assert_eq!(report.frames_processed, 0);
    assert_eq!(report.total_detections, 0);
    assert_eq!(report.frames_with_detections, 0);
    assert!(scheduler.session_started_at().unwrap() > first_start);
    assert_ne!(scheduler.session_id().unwrap(), first_id);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_noop() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK)], 5);
    scheduler.start().unwrap();
    let id = scheduler.session_id();

    scheduler.start().unwrap();
    assert_eq!(scheduler.session_id(), id);
}

#[tokio::test(start_paused = true)]
async fn test_high_rate_respects_delay_floor() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK)], 1000);
    scheduler.start().unwrap();

    // first cycle at 1 ms, then every 10 ms
    sleep(Duration::from_millis(105)).await;
    let frames = scheduler.latest_report().frames_processed;
    assert!((10..=11).contains(&frames), "ran {} cycles", frames);
}

#[tokio::test(start_paused = true)]
async fn test_target_fps_change_applies_on_next_rearm() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK)], 5);
    assert!(scheduler.set_target_fps(0).is_err());
    assert_eq!(scheduler.target_fps(), 5);

    scheduler.start().unwrap();
    sleep(Duration::from_millis(210)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 1);

    // the cycle armed at 200 ms still fires at 400 ms
    scheduler.set_target_fps(1).unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 2);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 2);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_source_size_change_reseeds() {
    let frames = vec![frame(8, DARK), frame(16, DARK), frame(16, BRIGHT)];
    let (scheduler, _sources) = scheduler_with(frames, 5);
    scheduler.start().unwrap();

    sleep(Duration::from_millis(210)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 0);
    assert!(scheduler.is_running());

    sleep(Duration::from_millis(200)).await;
    let report = scheduler.latest_report();
    assert_eq!(report.frames_processed, 1);
    assert_eq!(report.last_motion_count, 16);
}

#[tokio::test(start_paused = true)]
async fn test_detached_source_keeps_session_running() {
    let (scheduler, sources) = scheduler_with(vec![frame(8, DARK)], 5);
    scheduler.start().unwrap();

    sources.detach();
    sleep(Duration::from_millis(450)).await;
    assert!(scheduler.is_running());
    assert_eq!(scheduler.latest_report().frames_processed, 0);

    sources.attach(Arc::new(MemorySource::with_frames([frame(8, BRIGHT)])));
    // first cycle after reattach only reseeds, the next one compares
    sleep(Duration::from_millis(400)).await;
    assert_eq!(scheduler.latest_report().frames_processed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_events_are_published() {
    let (scheduler, _sources) = scheduler_with(vec![frame(8, DARK)], 5);
    let mut events = scheduler.event_bus().subscribe();

    scheduler.start().unwrap();
    scheduler.stop();

    assert_eq!(events.recv().await.unwrap().event_type(), "detection_started");
    match events.recv().await.unwrap() {
        MapeoEvent::DetectionStopped { session_id, .. } => assert!(session_id.is_some()),
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_display_override_sizes_overlay() {
    let sources = Arc::new(SourceSlot::new());
    sources.attach(Arc::new(MemorySource::with_frames([
        frame(8, DARK),
        frame(8, BRIGHT),
    ])));
    let scheduler = DetectionSchedulerBuilder::new()
        .detection(detection_config(5))
        .display(DisplayConfig {
            resolution: Some((64, 32)),
        })
        .sources(sources)
        .event_bus(EventBus::new(8))
        .build()
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_millis(210)).await;
    assert_eq!(scheduler.overlay_snapshot().dimensions(), (64, 32));
}
