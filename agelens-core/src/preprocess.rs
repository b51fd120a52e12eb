//! Tensor preparation for the face detector.

use std::borrow::Cow;

use agelens_utils::{
    compute_resize_scales,
    config::{InputDimensions, ResizeQuality},
    resize_rgb, rgb_to_bgr_chw, timing_guard,
};
use anyhow::{Result, anyhow};
use image::{RgbImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

/// Detector input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn filter(&self) -> FilterType {
        match self.resize_quality {
            ResizeQuality::Quality => FilterType::Triangle,
            ResizeQuality::Speed => FilterType::Nearest,
        }
    }
}

impl From<&InputDimensions> for PreprocessConfig {
    fn from(dimensions: &InputDimensions) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(dimensions.width, dimensions.height),
            resize_quality: dimensions.resize_quality,
        }
    }
}

/// A `[1, 3, H, W]` BGR tensor plus the factors that map detector
/// coordinates back onto the source image.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub tensor: Tensor,
    pub scale_x: f32,
    pub scale_y: f32,
}

/// Resize `image` to the detector input and lay it out like OpenCV's `blobFromImage`.
pub fn preprocess_rgb(image: &RgbImage, config: &PreprocessConfig) -> Result<PreprocessOutput> {
    let _guard = timing_guard("agelens_core::preprocess", log::Level::Trace);
    let InputSize { width, height } = config.input_size;
    anyhow::ensure!(
        width > 0 && height > 0,
        "detector input dimensions must be greater than zero"
    );
    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );

    let resized: Cow<'_, RgbImage> = if (orig_w, orig_h) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(resize_rgb(image, width, height, config.filter()))
    };

    let (data, offset) = rgb_to_bgr_chw(&resized).into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&[1, 3, height as usize, width as usize], &data)
        .map_err(|e| anyhow!("failed to build detector tensor: {e}"))?;

    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (width, height))?;
    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
    })
}
