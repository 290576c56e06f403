use crate::analyzer::{analyze_clip, ClipAnalysis, ProcessingSummary};
use crate::error::{CameraError, MapeoError};
use crate::export::{detections_to_csv, report_to_csv};
use crate::remote::VIDEO_FIELD;
use crate::source::validate_video_file;
use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use image::ImageOutputFormat;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::ServerState;

/// Error body: `{"error": "..."}`
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<MapeoError> for ApiError {
    fn from(err: MapeoError) -> Self {
        let status = match &err {
            MapeoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            MapeoError::Camera(CameraError::Pipeline { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        let message = match &err {
            MapeoError::InvalidInput { .. } => err.notice_text(),
            _ => err.to_string(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let report = state.stats.borrow().clone();

    let health_info = serde_json::json!({
        "status": "healthy",
        "detection": report.status,
        "live_session": state.scheduler.is_some(),
        "clip_processing": cfg!(all(feature = "camera", target_os = "linux")),
    });

    (StatusCode::OK, Json(health_info))
}

/// Latest published report
pub async fn stats_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let report = state.stats.borrow().clone();
    Json(report)
}

pub async fn stats_csv_handler(State(state): State<ServerState>) -> Result<Response, ApiError> {
    let report = state.stats.borrow().clone();
    let csv = report_to_csv(&report)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"detections.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

/// Current highlight overlay as PNG
pub async fn overlay_handler(State(state): State<ServerState>) -> Result<Response, ApiError> {
    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No live detection session"))?;

    let mut overlay = scheduler.overlay_snapshot();
    if overlay.width() == 0 || overlay.height() == 0 {
        // nothing rendered yet
        overlay = image::RgbaImage::new(1, 1);
    }
    let mut png = Cursor::new(Vec::new());
    overlay
        .write_to(&mut png, ImageOutputFormat::Png)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png.into_inner()).into_response())
}

/// Heatmap of the last processed clip as PNG
pub async fn heatmap_handler(State(state): State<ServerState>) -> Result<Response, ApiError> {
    let heatmap = state
        .last_clip
        .lock()
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No clip has been processed"))?
        .heatmap
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Last clip had no motion"))?;

    let png = tokio::task::spawn_blocking(move || heatmap.to_png())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// Per-cell `frame_idx,x,y` rows of the last processed clip
pub async fn detections_csv_handler(
    State(state): State<ServerState>,
) -> Result<Response, ApiError> {
    let csv = {
        let last_clip = state.last_clip.lock();
        let analysis = last_clip
            .as_ref()
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No clip has been processed"))?;
        detections_to_csv(&analysis.detections)?
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"clip_detections.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

/// Accept a multipart `video` upload and answer with its motion summary.
/// The heatmap and per-cell detections stay available until the next upload.
pub async fn process_handler(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessingSummary>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime = field.content_type().map(str::to_string);
        if let Err(e) = validate_video_file(&file_name, mime.as_deref()) {
            warn!("Rejected upload {} ({:?})", file_name, mime);
            return Err(e.into());
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Missing multipart field '{}'", VIDEO_FIELD),
        )
    })?;

    if !cfg!(all(feature = "camera", target_os = "linux")) {
        return Err(ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            "Clip processing is not available in this build",
        ));
    }

    info!("Processing upload {} ({} bytes)", file_name, data.len());
    let detection = state.detection.clone();
    let analysis = tokio::task::spawn_blocking(move || -> crate::error::Result<ClipAnalysis> {
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        let mut file = tempfile::Builder::new()
            .prefix("mapeo-upload-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        file.write_all(&data)?;
        file.flush()?;

        analyze_clip(file.path(), &detection)
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    let summary = analysis.summary.clone();
    info!(
        "Processed {} frames, {} detections",
        summary.total_frames, summary.total_detections
    );
    *state.last_clip.lock() = Some(analysis);
    Ok(Json(summary))
}
