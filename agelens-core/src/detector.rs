//! The face detection capability consumed by the fallback chain, and its
//! ONNX-backed implementation.

use std::path::Path;

use agelens_utils::{config::AppSettings, crop_region, timing_guard};
use anyhow::{Context, Result};
use image::RgbImage;
use log::debug;
use rayon::prelude::*;

use crate::{
    age_gender::AgeGenderModel,
    face_model::FaceModel,
    postprocess::{FaceBox, PostprocessConfig, select_faces},
    preprocess::{PreprocessConfig, preprocess_rgb},
    record::AgeGender,
};

/// Per-call detector options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectOptions {
    /// Overrides the configured score threshold when set.
    pub score_threshold: Option<f32>,
}

impl DetectOptions {
    pub fn with_threshold(score_threshold: f32) -> Self {
        Self {
            score_threshold: Some(score_threshold),
        }
    }
}

/// A detected face plus its attributes, if they could be estimated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnalysis {
    pub face: FaceBox,
    pub attributes: Option<AgeGender>,
}

/// Something that finds faces and estimates their age and gender.
///
/// Calls are blocking and CPU bound; async callers run them on a blocking pool.
pub trait FaceAnalyzer: Send + Sync {
    /// Face boxes in `image` pixel coordinates, most confident first.
    fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<FaceBox>>;

    /// Attributes for a single face crop, or `None` when nothing can be said.
    fn age_gender(&self, face: &RgbImage) -> Result<Option<AgeGender>>;

    /// Detect faces and estimate attributes for each of them.
    fn analyze(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<FaceAnalysis>> {
        self.detect(image, options)?
            .into_iter()
            .map(|face| {
                let attributes = match crop_region(image, face.rect.to_pixel_region()) {
                    Some(crop) => self.age_gender(&crop)?,
                    None => None,
                };
                Ok(FaceAnalysis { face, attributes })
            })
            .collect()
    }
}

/// YuNet face boxes followed by the age/gender head on each crop.
#[derive(Debug)]
pub struct FaceStack {
    faces: FaceModel,
    attributes: Option<AgeGenderModel>,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl FaceStack {
    pub fn new(
        faces: FaceModel,
        attributes: Option<AgeGenderModel>,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
    ) -> Self {
        Self {
            faces,
            attributes,
            preprocess,
            postprocess,
        }
    }

    /// Load both models named in `settings`.
    ///
    /// A missing age/gender path leaves attribute estimation disabled, in
    /// which case every record carries the default attributes.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let preprocess = PreprocessConfig::from(&settings.input);
        let face_path = settings
            .model_path
            .as_deref()
            .context("no face detector model configured")?;
        let faces = FaceModel::load(Path::new(face_path), preprocess.input_size)
            .with_context(|| format!("failed to load face detector from {face_path}"))?;
        let attributes = settings
            .age_gender_model_path
            .as_deref()
            .map(|path| {
                AgeGenderModel::load(path)
                    .with_context(|| format!("failed to load age/gender model from {path}"))
            })
            .transpose()?;
        if attributes.is_none() {
            debug!("age/gender model disabled; default attributes will be reported");
        }
        Ok(Self::new(
            faces,
            attributes,
            preprocess,
            PostprocessConfig::from(&settings.detection),
        ))
    }
}

impl FaceAnalyzer for FaceStack {
    fn detect(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<FaceBox>> {
        let _guard = timing_guard("agelens_core::detect", log::Level::Debug);
        let prep = preprocess_rgb(image, &self.preprocess)?;
        let raw = {
            let _guard = timing_guard("agelens_core::face_inference", log::Level::Debug);
            self.faces.run(prep.tensor)?
        };
        let config = PostprocessConfig {
            score_threshold: options
                .score_threshold
                .unwrap_or(self.postprocess.score_threshold),
            ..self.postprocess.clone()
        };
        let faces = select_faces(&raw, prep.scale_x, prep.scale_y, &config);
        debug!(
            "{} face(s) above {:.2} in {}x{}",
            faces.len(),
            config.score_threshold,
            image.width(),
            image.height()
        );
        Ok(faces)
    }

    fn age_gender(&self, face: &RgbImage) -> Result<Option<AgeGender>> {
        match &self.attributes {
            Some(model) => model.estimate(face).map(Some),
            None => Ok(None),
        }
    }

    fn analyze(&self, image: &RgbImage, options: &DetectOptions) -> Result<Vec<FaceAnalysis>> {
        let faces = self.detect(image, options)?;
        faces
            .into_par_iter()
            .map(|face| {
                let attributes = match crop_region(image, face.rect.to_pixel_region()) {
                    Some(crop) => self.age_gender(&crop)?,
                    None => None,
                };
                Ok(FaceAnalysis { face, attributes })
            })
            .collect()
    }
}
