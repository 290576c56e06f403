//! CSV and JSON export of detection statistics

use crate::analyzer::{ClipAnalysis, Detection, ProcessingSummary};
use crate::error::{MapeoError, Result};
use crate::session::StatsReport;
use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// A report stamped with when and from which session it was taken
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub session_id: Option<Uuid>,
    pub report: StatsReport,
}

impl ExportDocument {
    pub fn new(report: StatsReport, session_id: Option<Uuid>) -> Self {
        Self {
            generated_at: Utc::now(),
            session_id,
            report,
        }
    }
}

/// `metric,value` rows for a live report, header first
pub fn report_rows(report: &StatsReport) -> Vec<[String; 2]> {
    vec![
        ["metric".to_string(), "value".to_string()],
        row("framesProcessed", report.frames_processed),
        row("lastMotionCount", report.last_motion_count),
        row("totalDetections", report.total_detections),
        row("framesWithDetections", report.frames_with_detections),
        row("fps", format!("{:.2}", report.fps)),
        row("status", report.status),
    ]
}

/// `metric,value` rows for a processed clip, header first
pub fn summary_rows(summary: &ProcessingSummary) -> Vec<[String; 2]> {
    vec![
        ["metric".to_string(), "value".to_string()],
        row("total_frames", summary.total_frames),
        row("fps", summary.fps),
        row("duration_seconds", summary.duration_seconds),
        row("total_detections", summary.total_detections),
        row("frames_with_detections", summary.frames_with_detections),
        row("average_motion_per_frame", summary.average_motion_per_frame),
        row("average_motion_when_active", summary.average_motion_when_active),
        row("peak_motion_in_single_frame", summary.peak_motion_in_single_frame),
        row("estimated_motion_seconds", summary.estimated_motion_seconds),
    ]
}

/// `frame_idx,x,y` rows, one per motion cell, header first
pub fn detection_rows(detections: &[Detection]) -> Vec<[String; 3]> {
    let mut rows = Vec::with_capacity(detections.len() + 1);
    rows.push(["frame_idx".to_string(), "x".to_string(), "y".to_string()]);
    rows.extend(detections.iter().map(|d| {
        [d.frame_idx.to_string(), d.x.to_string(), d.y.to_string()]
    }));
    rows
}

pub fn detections_to_csv(detections: &[Detection]) -> Result<String> {
    rows_to_csv(&detection_rows(detections))
}

fn row<V: ToString>(metric: &str, value: V) -> [String; 2] {
    [metric.to_string(), value.to_string()]
}

/// Render rows with every cell quoted and embedded quotes doubled
pub fn rows_to_csv<R, C>(rows: &[R]) -> Result<String>
where
    R: AsRef<[C]>,
    C: AsRef<str>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());

    for record in rows {
        writer.write_record(record.as_ref().iter().map(|c| c.as_ref()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| MapeoError::system(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| MapeoError::system(format!("CSV is not UTF-8: {}", e)))
}

pub fn report_to_csv(report: &StatsReport) -> Result<String> {
    rows_to_csv(&report_rows(report))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write a timestamped export into `dir`, creating it if needed
pub fn export_to_file<P: AsRef<Path>>(
    dir: P,
    file_stem: &str,
    document: &ExportDocument,
    format: ExportFormat,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let file_name = format!(
        "{}_{}.{}",
        file_stem,
        document.generated_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    let path = dir.join(file_name);

    let contents = match format {
        ExportFormat::Csv => report_to_csv(&document.report)?,
        ExportFormat::Json => to_json(document)?,
    };
    fs::write(&path, contents)?;

    info!("Exported statistics to {}", path.display());
    Ok(path)
}

/// Write a clip's outputs into `dir`: `stats.json`, `stats_summary.csv`,
/// `detections.csv` and, when anything moved, `heatmap.png`
pub fn export_clip<P: AsRef<Path>>(dir: P, analysis: &ClipAnalysis) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(4);

    let path = dir.join("stats.json");
    fs::write(&path, to_json(&analysis.summary)?)?;
    written.push(path);

    let path = dir.join("stats_summary.csv");
    fs::write(&path, rows_to_csv(&summary_rows(&analysis.summary))?)?;
    written.push(path);

    let path = dir.join("detections.csv");
    fs::write(&path, detections_to_csv(&analysis.detections)?)?;
    written.push(path);

    match &analysis.heatmap {
        Some(heatmap) => {
            let path = dir.join("heatmap.png");
            heatmap.save_png(&path)?;
            written.push(path);
        }
        None => warn!("No motion detected; skipping heatmap"),
    }

    info!("Wrote {} clip outputs to {}", written.len(), dir.display());
    Ok(written)
}
