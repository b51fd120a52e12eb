//! Webcam frames for live detection.

use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use log::{debug, info, warn};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
};

use crate::config::LiveSettings;

/// An open camera stream producing RGB frames.
pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
    resolution: (u32, u32),
}

impl WebcamCapture {
    /// Open the device named in `settings` and request its resolution and frame rate.
    ///
    /// Drivers may ignore the requested format; [`WebcamCapture::resolution`]
    /// reports what was actually negotiated.
    pub fn open(settings: &LiveSettings) -> Result<Self> {
        let LiveSettings {
            device_index,
            width,
            height,
            fps,
            ..
        } = *settings;

        debug!("opening camera {device_index} at {width}x{height} @ {fps} fps");
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .with_context(|| format!("failed to open camera {device_index}"))?;
        camera
            .open_stream()
            .context("failed to start camera stream")?;

        if let Err(err) = camera.set_resolution(Resolution::new(width, height)) {
            warn!("camera rejected {width}x{height}: {err}; keeping driver default");
        }
        if let Err(err) = camera.set_frame_rate(fps) {
            warn!("camera rejected {fps} fps: {err}; keeping driver default");
        }

        let actual = camera.resolution();
        info!(
            "camera {device_index} streaming at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            device_index,
            resolution: (actual.width(), actual.height()),
        })
    }

    /// Grab and decode the next frame.
    pub fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame().context("failed to read camera frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("failed to decode camera frame")?;
        let (width, height) = self.resolution;
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("camera frame does not match {width}x{height}"))
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            warn!("failed to stop camera {}: {err}", self.device_index);
        } else {
            debug!("camera {} released", self.device_index);
        }
    }
}

/// Enumerate cameras as `(index, human name)` pairs.
pub fn list_webcam_devices() -> Result<Vec<(u32, String)>> {
    let devices = query(ApiBackend::Auto).context("failed to query cameras")?;
    Ok(devices
        .iter()
        .enumerate()
        .map(|(idx, info)| (idx as u32, info.human_name()))
        .collect())
}
