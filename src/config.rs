use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MapeoConfig {
    pub detection: DetectionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    pub remote: RemoteConfig,
    pub server: ServerConfig,
    pub export: ExportConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Target detection cycles per second
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// Summed R+G+B delta a grid point must exceed to count as motion
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Grid stride in pixels of the reduced snapshot
    #[serde(default = "default_step")]
    pub step: u32,

    /// Sampling resolution as a fraction of the source size, in (0, 1]
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// RGBA colour of the motion highlight rectangles
    #[serde(default = "default_highlight_color")]
    pub highlight_color: [u8; 4],
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct DisplayConfig {
    /// Overlay resolution (width, height); defaults to the source size
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CameraConfig {
    /// Camera device path (e.g. /dev/video0); the system default when unset
    #[serde(default)]
    pub device: Option<String>,

    /// Requested capture resolution
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,

    /// Requested capture frame rate
    #[serde(default)]
    pub fps: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RemoteConfig {
    /// URL of the upload processing endpoint
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,

    /// Request timeout for uploads
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Directory receiving exported reports
    #[serde(default = "default_export_path")]
    pub path: String,

    /// File name stem for exported reports
    #[serde(default = "default_export_file_stem")]
    pub file_stem: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl MapeoConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("mapeo.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let color = default_highlight_color();

        let settings = Config::builder()
            .set_default("detection.target_fps", default_target_fps())?
            .set_default("detection.threshold", default_threshold())?
            .set_default("detection.step", default_step())?
            .set_default("detection.scale", default_scale())?
            .set_default(
                "detection.highlight_color",
                color.iter().map(|c| *c as i64).collect::<Vec<i64>>(),
            )?
            .set_default("remote.endpoint", default_remote_endpoint())?
            .set_default("remote.timeout_seconds", default_remote_timeout() as i64)?
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("export.path", default_export_path())?
            .set_default("export.file_stem", default_export_file_stem())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // MAPEO_DETECTION__TARGET_FPS=10 overrides detection.target_fps
            .add_source(
                Environment::with_prefix("MAPEO")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MapeoConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.target_fps == 0 {
            return Err(ConfigError::Message(
                "Detection target_fps must be greater than 0".to_string(),
            ));
        }

        if self.detection.step == 0 {
            return Err(ConfigError::Message(
                "Detection step must be greater than 0".to_string(),
            ));
        }

        if !(self.detection.scale > 0.0 && self.detection.scale <= 1.0) {
            return Err(ConfigError::Message(format!(
                "Detection scale must be in (0, 1], got {}",
                self.detection.scale
            )));
        }

        if let Some((width, height)) = self.display.resolution {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(
                    "Display resolution must be greater than 0".to_string(),
                ));
            }
        }

        if let Some((width, height)) = self.camera.resolution {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(
                    "Camera resolution must be greater than 0".to_string(),
                ));
            }
        }

        if self.camera.fps == Some(0) {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.remote.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Remote endpoint must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for MapeoConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            display: DisplayConfig::default(),
            camera: CameraConfig::default(),
            remote: RemoteConfig {
                endpoint: default_remote_endpoint(),
                timeout_seconds: default_remote_timeout(),
            },
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
            },
            export: ExportConfig {
                path: default_export_path(),
                file_stem: default_export_file_stem(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            threshold: default_threshold(),
            step: default_step(),
            scale: default_scale(),
            highlight_color: default_highlight_color(),
        }
    }
}

// Default value functions
fn default_target_fps() -> u32 {
    5
}
fn default_threshold() -> u32 {
    30
}
fn default_step() -> u32 {
    4
}
fn default_scale() -> f64 {
    0.2
}
fn default_highlight_color() -> [u8; 4] {
    [16, 185, 129, 89]
} // emerald at ~35% opacity

fn default_remote_endpoint() -> String {
    "http://localhost:8000/process".to_string()
}
fn default_remote_timeout() -> u64 {
    120
}

fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8000
}

fn default_export_path() -> String {
    "./exports".to_string()
}
fn default_export_file_stem() -> String {
    "detections".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MapeoConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.detection.target_fps, 5);
        assert_eq!(config.detection.threshold, 30);
        assert_eq!(config.detection.step, 4);
        assert_eq!(config.detection.scale, 0.2);
        assert_eq!(config.server.port, 8000);
        assert!(config.display.resolution.is_none());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[detection]
target_fps = 12
threshold = 45
scale = 0.5

[display]
resolution = [1280, 720]

[remote]
endpoint = "http://processing.local:9000/process"
"#
        )
        .unwrap();

        let config = MapeoConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.detection.target_fps, 12);
        assert_eq!(config.detection.threshold, 45);
        assert_eq!(config.detection.step, 4);
        assert_eq!(config.detection.scale, 0.5);
        assert_eq!(config.detection.highlight_color, [16, 185, 129, 89]);
        assert_eq!(config.display.resolution, Some((1280, 720)));
        assert_eq!(config.remote.endpoint, "http://processing.local:9000/process");
        assert_eq!(config.export.file_stem, "detections");
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("MAPEO_SERVER__PORT", "9090");

        let config = MapeoConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.server.port, 9090);

        env::remove_var("MAPEO_SERVER__PORT");
    }

    #[test]
    fn test_config_validation() {
        let mut config = MapeoConfig::default();

        config.detection.scale = 0.0;
        assert!(config.validate().is_err());
        config.detection.scale = 1.5;
        assert!(config.validate().is_err());
        config.detection.scale = 1.0;
        assert!(config.validate().is_ok());

        config.detection.step = 0;
        assert!(config.validate().is_err());
        config.detection.step = 4;

        config.detection.target_fps = 0;
        assert!(config.validate().is_err());
        config.detection.target_fps = 5;

        config.display.resolution = Some((0, 480));
        assert!(config.validate().is_err());
        config.display.resolution = Some((640, 480));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = MapeoConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[detection]"));

        let parsed: MapeoConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, MapeoConfig::default());
    }
}
