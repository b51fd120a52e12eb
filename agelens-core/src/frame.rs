use std::{path::Path, sync::Arc};

use anyhow::Result;
use image::{DynamicImage, RgbImage};

use crate::geometry::{NaturalSpace, Size};

/// A decoded image and its natural pixel dimensions.
///
/// Pixel data is shared and never mutated, so cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pixels: Arc<RgbImage>,
}

impl ImageFrame {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_rgb8())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let image = agelens_utils::load_image(path)?;
        Ok(Self::from_dynamic(&image))
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub(crate) fn shared_pixels(&self) -> Arc<RgbImage> {
        Arc::clone(&self.pixels)
    }

    pub fn natural_width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn natural_size(&self) -> Size<NaturalSpace> {
        Size::from_pixels(self.natural_width(), self.natural_height())
    }
}

impl From<RgbImage> for ImageFrame {
    fn from(pixels: RgbImage) -> Self {
        Self::new(pixels)
    }
}
