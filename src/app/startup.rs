use super::{ComponentState, MapeoApp};
use crate::error::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

impl MapeoApp {
    /// Register the components this run will drive
    pub async fn initialize(&mut self) -> Result<()> {
        let mut states = self.component_states.lock().await;
        states.insert("source".to_string(), ComponentState::Stopped);
        states.insert("detection".to_string(), ComponentState::Stopped);
        if self.options.serve {
            states.insert("server".to_string(), ComponentState::Stopped);
        }
        if self.keyboard_handler.is_some() {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        self.warn_unsupported_source();
        Ok(())
    }

    /// Attach the source, bring up the optional surfaces and start detecting
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting mapeo");

        self.set_component_state("source", ComponentState::Starting)
            .await;
        let choice = self.options.source.clone();
        if let Err(e) = self.attach_source(&choice) {
            error!("Failed to attach source: {}", e);
            self.set_component_state("source", ComponentState::Failed)
                .await;
            self.event_bus.notify_error(&e);
            return Err(e);
        }
        self.set_component_state("source", ComponentState::Running)
            .await;

        if self.options.serve {
            self.start_server().await?;
        }

        if let Some(keyboard_handler) = &self.keyboard_handler {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;
            keyboard_handler.start().await?;
            self.set_component_state("keyboard", ComponentState::Running)
                .await;
        }

        // A camera needs a moment before its first frame lands
        self.set_component_state("detection", ComponentState::Starting)
            .await;
        let started = match self.wait_for_frame(self.options.frame_wait).await {
            Ok(()) => self.scheduler.start(),
            Err(e) => Err(e),
        };
        match started {
            Ok(()) => {
                self.set_component_state("detection", ComponentState::Running)
                    .await;
            }
            Err(e) => {
                warn!("Detection not started: {}", e);
                self.event_bus.notify_error(&e);
                self.set_component_state("detection", ComponentState::Stopped)
                    .await;
            }
        }

        self.spawn_stats_reporter();
        info!("mapeo started");
        Ok(())
    }

    #[cfg(feature = "server")]
    async fn start_server(&mut self) -> Result<()> {
        use crate::server::StatsServerBuilder;

        self.set_component_state("server", ComponentState::Starting)
            .await;
        let server = StatsServerBuilder::new()
            .config(self.config.server.clone())
            .detection(self.config.detection.clone())
            .scheduler(self.scheduler.clone())
            .build()?;
        let shutdown = self.cancellation_token.child_token();

        self.server_task = Some(tokio::spawn(async move { server.start(shutdown).await }));
        self.set_component_state("server", ComponentState::Running)
            .await;
        info!(
            "Stats server started on {}:{}",
            self.config.server.ip, self.config.server.port
        );
        Ok(())
    }

    #[cfg(not(feature = "server"))]
    async fn start_server(&mut self) -> Result<()> {
        warn!("Built without the server feature; not serving stats");
        self.set_component_state("server", ComponentState::Failed)
            .await;
        Ok(())
    }

    /// Log the live report once a second while it changes
    fn spawn_stats_reporter(&mut self) {
        let mut stats = self.scheduler.subscribe();
        let token = self.cancellation_token.clone();

        self.background_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !stats.has_changed().unwrap_or(false) {
                            continue;
                        }
                        let report = stats.borrow_and_update().clone();
                        info!(
                            status = %report.status,
                            frames = report.frames_processed,
                            motion = report.last_motion_count,
                            total = report.total_detections,
                            "{:.1} fps",
                            report.fps
                        );
                    }
                }
            }
        }));
    }
}
