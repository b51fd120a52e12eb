//! Settings shared by the agelens library crates and the CLI.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs to name
//! the values it wants to change.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum score for a face box in automatic mode and the first manual tier.
    pub score_threshold: f32,
    /// Score threshold used by the relaxed manual tier.
    pub relaxed_score_threshold: f32,
    /// IoU above which overlapping boxes are merged.
    pub nms_threshold: f32,
    /// Maximum number of boxes kept before suppression.
    pub top_k: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            relaxed_score_threshold: 0.1,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

/// Resize filter preference for detector input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Triangle filter.
    Quality,
    /// Nearest filter.
    #[default]
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Face detector input resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Speed,
        }
    }
}

/// Remote estimate endpoint used as the third manual-selection tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteSettings {
    /// Full URL of the estimate endpoint. `None` disables the tier.
    pub endpoint: Option<String>,
    /// Upper bound on the whole request, connect to body.
    pub timeout_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5_000,
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Values used when every estimation tier has failed, plus the confidence
/// stamped on records produced from a user-drawn selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FallbackSettings {
    pub age: f32,
    pub gender_probability: f32,
    pub confidence: f32,
    pub manual_confidence: f32,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            age: 30.0,
            gender_probability: 0.5,
            confidence: 0.5,
            manual_confidence: 0.99,
        }
    }
}

/// Manual selection gesture settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionSettings {
    /// A drag must exceed this many display units on both axes to be kept.
    pub min_size: f32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self { min_size: 20.0 }
    }
}

/// Live webcam detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveSettings {
    /// Interval between capture+analyze cycles.
    pub period_ms: u64,
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl LiveSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

/// Overlay projection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OverlaySettings {
    /// Quiet period after the last resize before overlays are re-projected.
    pub resize_debounce_ms: u64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            resize_debounce_ms: 100,
        }
    }
}

impl OverlaySettings {
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// YuNet face detector ONNX file.
    pub model_path: Option<String>,
    /// Age/gender ONNX head.
    pub age_gender_model_path: Option<String>,
    pub input: InputDimensions,
    pub detection: DetectionSettings,
    pub remote: RemoteSettings,
    pub fallback: FallbackSettings,
    pub selection: SelectionSettings,
    pub live: LiveSettings,
    pub overlay: OverlaySettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_path: Some(DEFAULT_FACE_MODEL.into()),
            age_gender_model_path: Some(DEFAULT_AGE_GENDER_MODEL.into()),
            input: InputDimensions::default(),
            detection: DetectionSettings::default(),
            remote: RemoteSettings::default(),
            fallback: FallbackSettings::default(),
            selection: SelectionSettings::default(),
            live: LiveSettings::default(),
            overlay: OverlaySettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

pub const DEFAULT_FACE_MODEL: &str = "models/face_detection_yunet_2023mar_640.onnx";
pub const DEFAULT_AGE_GENDER_MODEL: &str = "models/genderage.onnx";

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// Missing model paths fall back to the bundled defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model_path.is_none() {
            settings.model_path = Some(DEFAULT_FACE_MODEL.into());
        }
        if settings.age_gender_model_path.is_none() {
            settings.age_gender_model_path = Some(DEFAULT_AGE_GENDER_MODEL.into());
        }

        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Returns the default settings location (`config/agelens.json` under the working directory).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/agelens.json"))
        .unwrap_or_else(|_| PathBuf::from("config/agelens.json"))
}
