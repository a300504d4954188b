// src/config/model.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::devices::{ColorMode, ImageFormat, SimulatedDeviceConfig};
use crate::timer::TimerConfig;

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub logging:   LoggingConfig,
    pub schedule:  TimerConfig,
    pub scanning:  ScanningConfig,
    pub simulator: SimulatorConfig,
}

/// Raw file layout before durations are parsed and values validated
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)] pub logging:   LoggingConfig,
    pub schedule:                    IntervalTimerConfig,
    pub scanning:                    ScanningConfig,
    #[serde(default)] pub simulator: SimulatorConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[schedule]` table; durations are humantime strings ("1s", "2m 30s")
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalTimerConfig {
    #[serde(default = "zero")] pub delay:       String,
    pub interval:                               String,
    /// 0 = until stopped
    #[serde(default)]          pub repetitions: u32,
}
fn zero() -> String { "0s".into() }

impl TryFrom<&IntervalTimerConfig> for TimerConfig {
    type Error = ConfigError;

    fn try_from(raw: &IntervalTimerConfig) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.into(), e))
        };
        Ok(TimerConfig {
            delay:       parse(&raw.delay)?,
            interval:    parse(&raw.interval)?,
            repetitions: raw.repetitions,
        })
    }
}

/// Device-enablement, imaging and output parameters, handed to the scanning
/// service as one immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanningConfig {
    #[serde(default)] pub devices: DevicePolicy,
    #[serde(default)] pub imaging: ImagingParameters,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePolicy {
    /// Enablement of devices seen for the first time
    #[serde(default = "yes")] pub enable_new_devices: bool,
    /// Hardware ids that must never be dispatched
    #[serde(default)]         pub disabled:           Vec<String>,
}
fn yes() -> bool { true }

impl Default for DevicePolicy {
    fn default() -> Self {
        Self { enable_new_devices: true, disabled: Vec::new() }
    }
}

/// Per-capture parameters, passed through to the interop unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagingParameters {
    #[serde(default = "default_dpi")]   pub resolution_dpi: u32,
    #[serde(default = "default_color")] pub color_mode:     ColorMode,
    #[serde(default)]                   pub brightness:     Option<i32>,
    #[serde(default)]                   pub contrast:       Option<i32>,
}
fn default_dpi() -> u32 { 300 }
fn default_color() -> ColorMode { ColorMode::Color }

impl Default for ImagingParameters {
    fn default() -> Self {
        Self {
            resolution_dpi: default_dpi(),
            color_mode:     default_color(),
            brightness:     None,
            contrast:       None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub format:    ImageFormat,
    #[serde(default = "default_template")] pub file_name_template: String,
}
fn default_template() -> String { "{device}_{repetition}_{page}".into() }

/// Mirror of the `[simulator]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)] pub devices: Vec<SimulatedDeviceConfig>,
}

pub const MAX_RESOLUTION_DPI: u32 = 19_200;
pub const ADJUSTMENT_RANGE: std::ops::RangeInclusive<i32> = -1000..=1000;

impl ScanningConfig {
    pub fn new(directory: impl Into<PathBuf>, format: ImageFormat) -> Self {
        Self {
            devices: DevicePolicy::default(),
            imaging: ImagingParameters::default(),
            output:  OutputSettings {
                directory:          directory.into(),
                format,
                file_name_template: default_template(),
            },
        }
    }

    /// Structural checks that do not need a device. Format support against
    /// the interop is checked by the scanning service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dpi = self.imaging.resolution_dpi;
        if dpi == 0 || dpi > MAX_RESOLUTION_DPI {
            return Err(ConfigError::Invalid(format!(
                "resolution_dpi {} outside 1..={}", dpi, MAX_RESOLUTION_DPI
            )));
        }
        for (name, value) in [("brightness", self.imaging.brightness), ("contrast", self.imaging.contrast)] {
            if let Some(v) = value {
                if !ADJUSTMENT_RANGE.contains(&v) {
                    return Err(ConfigError::Invalid(format!("{} {} outside -1000..=1000", name, v)));
                }
            }
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output directory is empty".into()));
        }
        if self.output.file_name_template.trim().is_empty() {
            return Err(ConfigError::Invalid("file_name_template is empty".into()));
        }
        if self.devices.disabled.iter().any(|hw| hw.trim().is_empty()) {
            return Err(ConfigError::Invalid("blank hardware id in devices.disabled".into()));
        }
        Ok(())
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
