//! Command-line argument definitions for the agelens binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Estimate age and gender for faces in an image or a live webcam feed.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct AnalyzeArgs {
    /// Path to the image to analyze.
    #[arg(short, long, required_unless_present = "webcam")]
    pub input: Option<PathBuf>,

    /// Analyze a manually selected region instead of detecting faces: `x,y,w,h`
    /// in display units (see `--display`).
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_selection)]
    pub select: Option<SelectionArg>,

    /// Size of the surface the selection was drawn on, `WxH`. Defaults to the
    /// image's own size.
    #[arg(long, value_name = "WxH", value_parser = parse_display, requires = "select")]
    pub display: Option<(f32, f32)>,

    /// Run periodic detection on webcam frames.
    #[arg(long, conflicts_with_all = ["input", "select"])]
    pub webcam: bool,

    /// Webcam device index (defaults to settings).
    #[arg(long, requires = "webcam")]
    pub webcam_device: Option<u32>,

    /// Webcam capture width.
    #[arg(long, requires = "webcam")]
    pub webcam_width: Option<u32>,

    /// Webcam capture height.
    #[arg(long, requires = "webcam")]
    pub webcam_height: Option<u32>,

    /// Webcam frame rate.
    #[arg(long, requires = "webcam")]
    pub webcam_fps: Option<u32>,

    /// Milliseconds between live analysis cycles.
    #[arg(long, requires = "webcam")]
    pub live_period_ms: Option<u64>,

    /// Stop after this many live cycles (default: run until Ctrl+C).
    #[arg(long, requires = "webcam")]
    pub cycles: Option<usize>,

    /// Path to the YuNet face detection model.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Path to the age/gender model.
    #[arg(long)]
    pub age_gender_model: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/agelens.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Remote estimate endpoint used when manual detection finds nothing.
    #[arg(long, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Remote estimate timeout in milliseconds.
    #[arg(long)]
    pub remote_timeout_ms: Option<u64>,

    /// Override the detector score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Write the result JSON to a file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Directory to write the image with boxes and labels drawn on it.
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

/// A selection rectangle given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionArg {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

fn parse_floats<const N: usize>(value: &str, separator: char) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    let mut parts = value.split(separator);
    for slot in &mut out {
        *slot = parts.next()?.trim().parse::<f32>().ok()?;
        if !slot.is_finite() {
            return None;
        }
    }
    parts.next().is_none().then_some(out)
}

pub fn parse_selection(value: &str) -> Result<SelectionArg, String> {
    let [x, y, width, height] = parse_floats::<4>(value, ',')
        .ok_or_else(|| format!("expected x,y,w,h but got `{value}`"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("selection size must be positive, got {width}x{height}"));
    }
    Ok(SelectionArg {
        x,
        y,
        width,
        height,
    })
}

pub fn parse_display(value: &str) -> Result<(f32, f32), String> {
    let [width, height] = parse_floats::<2>(&value.to_ascii_lowercase(), 'x')
        .ok_or_else(|| format!("expected WxH but got `{value}`"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("display size must be positive, got {value}"));
    }
    Ok((width, height))
}
