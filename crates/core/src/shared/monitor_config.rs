use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::association::associator::MatchPolicy;
use crate::shared::constants::{
    DEFAULT_CONFIDENCE_FLOOR, DEFAULT_EQUIPMENT_CLASS, DEFAULT_FACE_CONFIDENCE,
    DEFAULT_JPEG_QUALITY, DEFAULT_MATCH_TOLERANCE, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_STARTUP_ATTEMPTS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings for one monitored camera.
///
/// Every field has a default, so a config file only needs to list the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub camera: String,
    pub input_format: Option<String>,
    pub gallery_dir: PathBuf,
    pub face_model: Option<PathBuf>,
    pub embedding_model: Option<PathBuf>,
    pub equipment_model: Option<PathBuf>,
    pub equipment_labels: Option<PathBuf>,
    pub confidence_floor: f64,
    pub face_confidence: f64,
    pub match_tolerance: f64,
    pub equipment_class: String,
    pub match_policy: MatchPolicy,
    pub directory_url: String,
    pub directory_timeout_ms: u64,
    pub directory_attempts: u32,
    pub directory_queue: usize,
    /// Longest wait for pending directory updates at shutdown.
    pub directory_flush_ms: u64,
    pub retry_backoff_ms: u64,
    pub startup_attempts: u32,
    pub jpeg_quality: u8,
    pub parallel_inference: bool,
    /// TrueType font for face labels; common system fonts are tried if unset.
    pub label_font: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            camera: default_camera().to_string(),
            input_format: default_input_format().map(str::to_string),
            gallery_dir: PathBuf::from("known_faces"),
            face_model: None,
            embedding_model: None,
            equipment_model: None,
            equipment_labels: None,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            face_confidence: DEFAULT_FACE_CONFIDENCE,
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
            equipment_class: DEFAULT_EQUIPMENT_CLASS.to_string(),
            match_policy: MatchPolicy::FirstMatch,
            directory_url: "http://localhost:8000".to_string(),
            directory_timeout_ms: 2000,
            directory_attempts: 3,
            directory_queue: 256,
            directory_flush_ms: 5000,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            startup_attempts: DEFAULT_STARTUP_ATTEMPTS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            parallel_inference: true,
            label_font: None,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::Invalid(format!(
                "confidence_floor must be within 0.0-1.0, got {}",
                self.confidence_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.face_confidence) {
            return Err(ConfigError::Invalid(format!(
                "face_confidence must be within 0.0-1.0, got {}",
                self.face_confidence
            )));
        }
        if self.match_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "match_tolerance must be positive".to_string(),
            ));
        }
        if self.equipment_class.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "equipment_class must not be empty".to_string(),
            ));
        }
        if self.directory_attempts == 0 || self.directory_queue == 0 {
            return Err(ConfigError::Invalid(
                "directory_attempts and directory_queue must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1-100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    pub fn directory_flush(&self) -> Duration {
        Duration::from_millis(self.directory_flush_ms)
    }
}

fn default_camera() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "/dev/video0"
    }
    #[cfg(not(target_os = "linux"))]
    {
        "0"
    }
}

/// ffmpeg capture-device demuxer for the current platform.
fn default_input_format() -> Option<&'static str> {
    #[cfg(target_os = "linux")]
    {
        Some("v4l2")
    }
    #[cfg(target_os = "macos")]
    {
        Some("avfoundation")
    }
    #[cfg(target_os = "windows")]
    {
        Some("dshow")
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
