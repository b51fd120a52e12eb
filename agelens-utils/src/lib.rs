//! Common helpers shared across the agelens crates.

/// Application settings and their JSON persistence.
pub mod config;
/// Image loading, cropping, tensor layout and JPEG encoding.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;
/// Webcam frame capture.
pub mod webcam;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use image_utils::{
    PixelRegion, compute_resize_scales, crop_region, encode_jpeg, encode_jpeg_data_url,
    load_image, resize_rgb, rgb_to_bgr_chw, rgb_to_rgb_chw,
};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};
pub use webcam::{WebcamCapture, list_webcam_devices};

/// Initialize logging once for CLI and test environments.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Calling this
/// more than once is harmless.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
