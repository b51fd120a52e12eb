//! Shared helpers for agelens CLI integration tests.
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

const FACE_MODEL: &str = "models/face_detection_yunet_2023mar_640.onnx";
const AGE_GENDER_MODEL: &str = "models/genderage.onnx";

fn find(rel: &str) -> Option<PathBuf> {
    [PathBuf::from(rel), Path::new("..").join(rel)]
        .into_iter()
        .find(|p| p.exists())
}

/// Both ONNX models, or `None` when either is missing.
pub fn find_models() -> Option<(PathBuf, PathBuf)> {
    let models = find(FACE_MODEL).zip(find(AGE_GENDER_MODEL));
    if models.is_none() {
        eprintln!("Skipping test: models not found");
    }
    models
}

/// Write a flat gray image with no faces in it.
pub fn write_blank_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
        .save(&path)
        .expect("save blank image");
    path
}
