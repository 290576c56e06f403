use crate::error::{MapeoError, Result};
use std::path::Path;

/// File extensions accepted when no media type is declared
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "mkv", "avi", "flv", "wmv"];

/// Video type gate: a declared `video/*` media type wins, otherwise the
/// extension decides (case-insensitive).
pub fn is_video_file(name: &str, mime: Option<&str>) -> bool {
    if let Some(mime) = mime {
        if mime.trim().to_ascii_lowercase().starts_with("video/") {
            return true;
        }
    }

    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Reject anything that fails the video type gate before it is loaded
pub fn validate_video_file<P: AsRef<Path>>(path: P, mime: Option<&str>) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    if is_video_file(&name, mime) {
        Ok(())
    } else {
        Err(MapeoError::invalid_input(
            name,
            "select only video files".to_string(),
        ))
    }
}
