//! Client for the upload-processing endpoint

use crate::config::RemoteConfig;
use crate::error::{MapeoError, RemoteError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Multipart field carrying the uploaded clip
pub const VIDEO_FIELD: &str = "video";

/// Posts whole video files to a processing server, one request per file
#[derive(Debug, Clone)]
pub struct RemoteProcessor {
    endpoint: String,
    timeout: Duration,
}

impl RemoteProcessor {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload a file and return the server's JSON answer. Blocking.
    pub fn process_file<P: AsRef<Path>>(&self, path: P) -> Result<serde_json::Value> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let contents = std::fs::read(path)?;

        info!(
            "Uploading {} ({} bytes) to {}",
            file_name,
            contents.len(),
            self.endpoint
        );

        let boundary = format!("mapeo-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, VIDEO_FIELD, &file_name, &contents);

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = agent
            .post(&self.endpoint)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => RemoteError::Status { code },
                ureq::Error::Transport(transport) => RemoteError::Transport {
                    details: transport.to_string(),
                },
            })?;

        let text = response.into_string().map_err(|e| RemoteError::Decode {
            details: e.to_string(),
        })?;
        let value = serde_json::from_str(&text).map_err(|e| RemoteError::Decode {
            details: e.to_string(),
        })?;

        debug!("Processing server answered for {}", file_name);
        Ok(value)
    }

    /// Async wrapper running the upload on the blocking pool
    pub async fn process_file_async(&self, path: PathBuf) -> Result<serde_json::Value> {
        let processor = self.clone();
        tokio::task::spawn_blocking(move || processor.process_file(path))
            .await
            .map_err(|e| {
                MapeoError::component("remote".to_string(), format!("upload task failed: {}", e))
            })?
    }
}

/// Single-part `multipart/form-data` body
pub(crate) fn multipart_body(boundary: &str, field: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mime = guess_mime(file_name);
    let mut body = Vec::with_capacity(contents.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field,
            file_name.replace('"', "_")
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn guess_mime(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("ogg") => "video/ogg",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("flv") => "video/x-flv",
        Some("wmv") => "video/x-ms-wmv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("XYZ", VIDEO_FIELD, "clip.MOV", b"abc");
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--XYZ\r\n"));
        assert!(text.contains("name=\"video\"; filename=\"clip.MOV\""));
        assert!(text.contains("Content-Type: video/quicktime\r\n\r\nabc\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"not really a video").unwrap();

        let processor = RemoteProcessor::new(&RemoteConfig {
            endpoint: "http://127.0.0.1:9/process".to_string(),
            timeout_seconds: 2,
        });

        match processor.process_file(file.path()) {
            Err(MapeoError::Remote(RemoteError::Transport { .. })) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let processor = RemoteProcessor::new(&RemoteConfig {
            endpoint: "http://127.0.0.1:9/process".to_string(),
            timeout_seconds: 2,
        });
        assert!(matches!(
            processor.process_file("/nonexistent/clip.mp4"),
            Err(MapeoError::Io(_))
        ));
    }
}
