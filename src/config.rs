//! Station configuration loaded from a TOML file.
//!
//! Every field has a default mirroring the station's bench setup, so a missing
//! config file yields a runnable configuration. Port and baud rate are
//! externally configured values the core receives, not chooses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QcError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub serial: SerialConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub analyzer: AnalyzerConfig,
    pub run: RunConfig,
}

/// Serial link to the actuator/indicator board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Write timeout, so an unresponsive board cannot hang the worker.
    pub timeout_ms: u64,
    /// The board resets when the host opens the line; wait this long before
    /// the port counts as usable.
    pub settle_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
            settle_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// A physical webcam (requires the `uvc` cargo feature).
    Uvc,
    /// Still images replayed from a directory; bench and dry-run source.
    Folder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: CameraSource,
    pub index: u32,
    pub folder: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::Uvc,
            index: 0,
            folder: PathBuf::from("bench_images"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub output_dir: PathBuf,
    pub frames_per_run: usize,
    /// Delay between successive reads; lets the physical stage move and
    /// settle. Part of the capture contract, not an incidental sleep.
    pub inter_frame_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("captured_images"),
            frames_per_run: 4,
            inter_frame_delay_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub min_rectangularity: f64,
    pub max_rectangularity: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_rectangularity: crate::analyzer::RECTANGULARITY_MIN,
            max_rectangularity: crate::analyzer::RECTANGULARITY_MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Physical reset time for the hardware before the next run may start.
    pub cooldown_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { cooldown_ms: 5000 }
    }
}

impl StationConfig {
    /// Default config file location, e.g. `~/.config/qc-station/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qc-station")
            .join("config.toml")
    }

    /// Load the config from `path`, or from the default location.
    /// A missing file is not an error: defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, QcError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| QcError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| QcError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.serial.settle_delay_ms)
    }

    pub fn inter_frame_delay(&self) -> Duration {
        Duration::from_millis(self.capture.inter_frame_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.run.cooldown_ms)
    }
}
