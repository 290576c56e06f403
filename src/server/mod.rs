mod handlers;

use crate::analyzer::ClipAnalysis;
use crate::config::{DetectionConfig, ServerConfig};
use crate::error::{MapeoError, Result};
use crate::session::{DetectionScheduler, StatsReport};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use handlers::{
    detections_csv_handler, health_handler, heatmap_handler, overlay_handler, process_handler,
    stats_csv_handler, stats_handler,
};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) stats: watch::Receiver<StatsReport>,
    pub(crate) scheduler: Option<DetectionScheduler>,
    pub(crate) detection: DetectionConfig,
    /// Outputs of the most recently processed upload
    pub(crate) last_clip: Arc<Mutex<Option<ClipAnalysis>>>,
}

/// HTTP surface: live stats, CSV export, clip processing and its heatmap
pub struct StatsServer {
    pub(crate) config: ServerConfig,
    state: ServerState,
}

impl StatsServer {
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        info!("Starting stats server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            MapeoError::component("server".to_string(), format!("Failed to bind {}: {}", addr, e))
        })?;

        info!("Stats server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| {
                MapeoError::component("server".to_string(), format!("Server error: {}", e))
            })?;

        info!("Stats server stopped");
        Ok(())
    }
}

pub(crate) fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/stats.csv", get(stats_csv_handler))
        .route("/overlay.png", get(overlay_handler))
        .route("/process", post(process_handler))
        .route("/heatmap.png", get(heatmap_handler))
        .route("/detections.csv", get(detections_csv_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builder for the stats server
pub struct StatsServerBuilder {
    config: Option<ServerConfig>,
    detection: DetectionConfig,
    scheduler: Option<DetectionScheduler>,
    stats: Option<watch::Receiver<StatsReport>>,
}

impl StatsServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            detection: DetectionConfig::default(),
            scheduler: None,
            stats: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Detection settings used for processing uploaded clips
    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    /// Serve live stats and overlay of a running scheduler
    pub fn scheduler(mut self, scheduler: DetectionScheduler) -> Self {
        self.stats = Some(scheduler.subscribe());
        self.scheduler = Some(scheduler);
        self
    }

    pub fn stats(mut self, stats: watch::Receiver<StatsReport>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn build(self) -> Result<StatsServer> {
        let config = self
            .config
            .ok_or_else(|| MapeoError::system("Server configuration is required"))?;

        // without a live session the stats endpoint reports idle forever
        let stats = self
            .stats
            .unwrap_or_else(|| watch::channel(StatsReport::default()).1);

        Ok(StatsServer::new(
            config,
            ServerState {
                stats,
                scheduler: self.scheduler,
                detection: self.detection,
                last_clip: Arc::new(Mutex::new(None)),
            },
        ))
    }
}

impl Default for StatsServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
