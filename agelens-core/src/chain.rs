//! Automatic detection and the ordered manual-selection fallback tiers.
//!
//! Automatic mode runs the detector over the whole frame and fails with
//! [`AnalysisError::NoFacesDetected`] when nothing is found. Manual mode
//! tries [`MANUAL_TIERS`] in order on the selected crop and, when all of them
//! fail, synthesizes a fixed record, so it always yields exactly one record.

use std::{fmt, sync::Arc, time::Duration};

use agelens_utils::{
    config::{AppSettings, FallbackSettings},
    crop_region, encode_jpeg, timing_guard,
};
use anyhow::Context;
use image::RgbImage;
use log::{debug, warn};
use thiserror::Error;

use crate::{
    detector::{DetectOptions, FaceAnalysis, FaceAnalyzer},
    error::{AnalysisError, RemoteEstimateError},
    frame::ImageFrame,
    geometry::{NaturalSpace, Rect},
    record::{AgeGender, AnalysisResult, DetectionRecord, DetectionSource},
    remote::RemoteEstimator,
};

/// Manual-selection estimation attempts, before the synthesized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualTier {
    /// Detector on the crop at its default threshold.
    Direct,
    /// Detector on the crop at the relaxed threshold.
    Relaxed,
    /// Remote estimate collaborator on the JPEG-encoded crop.
    Remote,
}

pub const MANUAL_TIERS: [ManualTier; 3] =
    [ManualTier::Direct, ManualTier::Relaxed, ManualTier::Remote];

impl ManualTier {
    pub fn source(self) -> DetectionSource {
        match self {
            ManualTier::Direct => DetectionSource::Model,
            ManualTier::Relaxed => DetectionSource::ModelRelaxed,
            ManualTier::Remote => DetectionSource::RemoteEstimate,
        }
    }
}

impl fmt::Display for ManualTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManualTier::Direct => "direct",
            ManualTier::Relaxed => "relaxed",
            ManualTier::Remote => "remote",
        })
    }
}

/// Why a manual tier did not produce attributes.
#[derive(Debug, Error)]
enum TierFailure {
    #[error("expected exactly one face, found {0}")]
    FaceCount(usize),
    #[error("no face with age/gender attributes")]
    NoAttributes,
    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),
    #[error(transparent)]
    Remote(#[from] RemoteEstimateError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainSettings {
    pub relaxed_score_threshold: f32,
    pub remote_timeout: Duration,
    pub jpeg_quality: u8,
    pub fallback: FallbackSettings,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for ChainSettings {
    fn from(settings: &AppSettings) -> Self {
        Self {
            relaxed_score_threshold: settings.detection.relaxed_score_threshold,
            remote_timeout: settings.remote.timeout(),
            jpeg_quality: 90,
            fallback: settings.fallback.clone(),
        }
    }
}

/// Runs detection for one analysis cycle.
pub struct DetectionFallbackChain<A, R> {
    analyzer: Arc<A>,
    remote: R,
    settings: ChainSettings,
}

impl<A, R> DetectionFallbackChain<A, R>
where
    A: FaceAnalyzer + 'static,
    R: RemoteEstimator,
{
    pub fn new(analyzer: Arc<A>, remote: R, settings: ChainSettings) -> Self {
        Self {
            analyzer,
            remote,
            settings,
        }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn analyzer(&self) -> &Arc<A> {
        &self.analyzer
    }

    /// Analyze `frame`, restricted to `selection` (natural pixels) when given.
    pub async fn analyze(
        &self,
        frame: &ImageFrame,
        selection: Option<Rect<NaturalSpace>>,
    ) -> Result<AnalysisResult, AnalysisError> {
        match selection {
            None => self.analyze_automatic(frame).await,
            Some(selection) => Ok(self.analyze_manual(frame, selection).await),
        }
    }

    async fn analyze_automatic(&self, frame: &ImageFrame) -> Result<AnalysisResult, AnalysisError> {
        let _guard = timing_guard("agelens_core::automatic", log::Level::Debug);
        let faces = self
            .run_analyzer(frame.shared_pixels(), DetectOptions::default())
            .await
            .map_err(|e| AnalysisError::Detector(format!("{e:#}")))?;
        if faces.is_empty() {
            return Err(AnalysisError::NoFacesDetected);
        }

        let bounds = frame.natural_size();
        let records = faces
            .into_iter()
            .map(|FaceAnalysis { face, attributes }| {
                DetectionRecord::new(
                    attributes.unwrap_or_default(),
                    face.score,
                    face.rect.clamp_to(bounds).unwrap_or(face.rect),
                    DetectionSource::Model,
                    &self.settings.fallback,
                )
            })
            .collect();
        Ok(AnalysisResult::new(records))
    }

    async fn analyze_manual(
        &self,
        frame: &ImageFrame,
        selection: Rect<NaturalSpace>,
    ) -> AnalysisResult {
        let _guard = timing_guard("agelens_core::manual", log::Level::Debug);
        let fallback = &self.settings.fallback;

        let estimate = match crop_region(frame.pixels(), selection.to_pixel_region()) {
            Some(crop) => self.run_tiers(Arc::new(crop)).await,
            None => {
                warn!(
                    "selection {:?} does not overlap the {}x{} frame",
                    selection,
                    frame.natural_width(),
                    frame.natural_height()
                );
                None
            }
        };

        let record = match estimate {
            Some((attributes, source)) => DetectionRecord::new(
                attributes,
                fallback.manual_confidence,
                selection,
                source,
                fallback,
            ),
            None => {
                debug!("all manual tiers failed; using synthesized record");
                DetectionRecord::synthesized(selection, fallback)
            }
        };
        AnalysisResult::new(vec![record])
    }

    async fn run_tiers(&self, crop: Arc<RgbImage>) -> Option<(AgeGender, DetectionSource)> {
        for tier in MANUAL_TIERS {
            let _guard = timing_guard(format!("agelens_core::tier::{tier}"), log::Level::Debug);
            match self.attempt(tier, &crop).await {
                Ok(attributes) => {
                    debug!("{tier} tier produced attributes");
                    return Some((attributes, tier.source()));
                }
                Err(failure) => warn!("{tier} tier failed: {failure}"),
            }
        }
        None
    }

    async fn attempt(
        &self,
        tier: ManualTier,
        crop: &Arc<RgbImage>,
    ) -> Result<AgeGender, TierFailure> {
        match tier {
            ManualTier::Direct => {
                let faces = self
                    .run_analyzer(Arc::clone(crop), DetectOptions::default())
                    .await
                    .map_err(TierFailure::Detector)?;
                match faces.as_slice() {
                    [only] => only.attributes.ok_or(TierFailure::NoAttributes),
                    other => Err(TierFailure::FaceCount(other.len())),
                }
            }
            ManualTier::Relaxed => {
                let options = DetectOptions::with_threshold(self.settings.relaxed_score_threshold);
                let faces = self
                    .run_analyzer(Arc::clone(crop), options)
                    .await
                    .map_err(TierFailure::Detector)?;
                if faces.is_empty() {
                    return Err(TierFailure::FaceCount(0));
                }
                faces
                    .iter()
                    .find_map(|face| face.attributes)
                    .ok_or(TierFailure::NoAttributes)
            }
            ManualTier::Remote => {
                let jpeg = encode_jpeg(crop, self.settings.jpeg_quality)
                    .map_err(|e| RemoteEstimateError::Encode(format!("{e:#}")))?;
                let timeout = self.settings.remote_timeout;
                let estimates = tokio::time::timeout(timeout, self.remote.estimate(jpeg))
                    .await
                    .map_err(|_| RemoteEstimateError::Timeout(timeout))??;
                let first = estimates.first().ok_or(RemoteEstimateError::Empty)?;
                Ok(first.attributes())
            }
        }
    }

    async fn run_analyzer(
        &self,
        image: Arc<RgbImage>,
        options: DetectOptions,
    ) -> anyhow::Result<Vec<FaceAnalysis>> {
        let analyzer = Arc::clone(&self.analyzer);
        tokio::task::spawn_blocking(move || analyzer.analyze(&image, &options))
            .await
            .context("detector task did not complete")?
    }
}
