use super::{ComponentState, MapeoApp, ShutdownReason};
use crate::error::{MapeoError, Result};
use crate::export::{ExportDocument, ExportFormat};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl MapeoApp {
    /// Stop detection, write the final report and release everything.
    /// Returns the process exit code.
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };

        if let Some(keyboard_handler) = &self.keyboard_handler {
            let stop = keyboard_handler.stop();
            if let Err(e) = self
                .stop_component("keyboard", Duration::from_secs(2), stop)
                .await
            {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        self.set_component_state("detection", ComponentState::Stopping)
            .await;
        let session_id = self.scheduler.session_id();
        let report = self.scheduler.stop();
        self.set_component_state("detection", ComponentState::Stopped)
            .await;
        info!(
            "Final report: {} frames, {} detections in {} active frames",
            report.frames_processed, report.total_detections, report.frames_with_detections
        );

        if report.frames_processed > 0 {
            let document = ExportDocument::new(report, session_id);
            for format in [ExportFormat::Csv, ExportFormat::Json] {
                match self.write_export(&document, format) {
                    Ok(path) => info!("Wrote {}", path.display()),
                    Err(e) => {
                        error!("Failed to export final report: {}", e);
                        exit_code = 1;
                    }
                }
            }
        }

        // Server and background tasks all hang off this token
        self.cancellation_token.cancel();

        if let Some(server_task) = self.server_task.take() {
            let stop = async move {
                server_task
                    .await
                    .map_err(|e| MapeoError::component("server".to_string(), e.to_string()))?
            };
            if let Err(e) = self
                .stop_component("server", Duration::from_secs(5), stop)
                .await
            {
                error!("Error stopping server: {}", e);
                exit_code = 1;
            }
        }

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        self.set_component_state("source", ComponentState::Stopping)
            .await;
        self.release_source();
        self.set_component_state("source", ComponentState::Stopped)
            .await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                warn!("{} component stop timeout", component);
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(MapeoError::component(
                    component.to_string(),
                    "stop timeout".to_string(),
                ))
            }
        }
    }
}
