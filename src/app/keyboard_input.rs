use crate::config::ExportConfig;
use crate::error::Result;
use crate::events::{EventBus, MapeoEvent};
use crate::export::{export_to_file, ExportDocument, ExportFormat};
use crate::session::DetectionScheduler;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FPS_STEP: u32 = 1;
const MAX_FPS: u32 = 60;
const THRESHOLD_STEP: u32 = 10;
/// Largest possible |dR| + |dG| + |dB|
const MAX_THRESHOLD: u32 = 3 * 255;

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ToggleDetection,
    FasterRate,
    SlowerRate,
    RaiseThreshold,
    LowerThreshold,
    Export,
    Quit,
    Ignore,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Self {
        match code {
            KeyCode::Char(' ') => KeyAction::ToggleDetection,
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => KeyAction::FasterRate,
            KeyCode::Char('-') | KeyCode::Down => KeyAction::SlowerRate,
            KeyCode::Char(']') => KeyAction::RaiseThreshold,
            KeyCode::Char('[') => KeyAction::LowerThreshold,
            KeyCode::Char('e') => KeyAction::Export,
            KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
            _ => KeyAction::Ignore,
        }
    }
}

/// Terminal controls for a live detection run
pub struct KeyboardInputHandler {
    scheduler: DetectionScheduler,
    event_bus: EventBus,
    export: ExportConfig,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(scheduler: DetectionScheduler, event_bus: EventBus, export: ExportConfig) -> Self {
        Self {
            scheduler,
            event_bus,
            export,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Carry out one key action. Returns `false` once the handler should stop reading keys.
    pub fn apply(&self, action: KeyAction) -> bool {
        apply_action(&self.scheduler, &self.event_bus, &self.export, action)
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard controls: SPACE start/stop, +/- rate, [/] threshold, e export, q quit");

        let scheduler = self.scheduler.clone();
        let event_bus = self.event_bus.clone();
        let export = self.export.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            let action = KeyAction::from_key(key_event.code);
                            if action == KeyAction::Ignore {
                                debug!("Key pressed: {:?}", key_event.code);
                                continue;
                            }
                            if !apply_action(&scheduler, &event_bus, &export, action) {
                                break;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll interval to leave raw mode itself
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

fn apply_action(
    scheduler: &DetectionScheduler,
    event_bus: &EventBus,
    export: &ExportConfig,
    action: KeyAction,
) -> bool {
    match action {
        KeyAction::ToggleDetection => match scheduler.toggle() {
            Ok(status) => info!("Detection {}", status),
            Err(e) => {
                event_bus.notify_error(&e);
            }
        },
        KeyAction::FasterRate | KeyAction::SlowerRate => {
            let current = scheduler.target_fps();
            let next = if action == KeyAction::FasterRate {
                (current + FPS_STEP).min(MAX_FPS)
            } else {
                current.saturating_sub(FPS_STEP).max(1)
            };
            if next != current {
                if let Err(e) = scheduler.set_target_fps(next) {
                    event_bus.notify_error(&e);
                } else {
                    info!("Target rate {} fps", next);
                }
            }
        }
        KeyAction::RaiseThreshold | KeyAction::LowerThreshold => {
            let mut params = scheduler.detection_params();
            let next = if action == KeyAction::RaiseThreshold {
                (params.threshold + THRESHOLD_STEP).min(MAX_THRESHOLD)
            } else {
                params.threshold.saturating_sub(THRESHOLD_STEP)
            };
            if next != params.threshold {
                params.threshold = next;
                scheduler.update_params(params);
                info!("Motion threshold {}", next);
            }
        }
        KeyAction::Export => {
            let document =
                ExportDocument::new(scheduler.latest_report(), scheduler.session_id());
            match export_to_file(&export.path, &export.file_stem, &document, ExportFormat::Csv) {
                Ok(path) => info!("Exported report to {}", path.display()),
                Err(e) => {
                    event_bus.notify_error(&e);
                }
            }
        }
        KeyAction::Quit => {
            info!("Quit key pressed - requesting shutdown");
            event_bus.publish(MapeoEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            });
            return false;
        }
        KeyAction::Ignore => {}
    }
    true
}
