use std::cmp::Ordering;

use agelens_utils::config::DetectionSettings;

use crate::geometry::{NaturalSpace, Rect};

/// Score filtering and suppression parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        DetectionSettings::default().into()
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        Self::from(&settings)
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

/// One decoded detector cell in detector-input pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFace {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

/// A face box in the pixel space of the analyzed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub rect: Rect<NaturalSpace>,
    pub score: f32,
}

/// Keep confident cells, rescale them to the source image, and suppress overlaps.
///
/// The result is ordered by descending score.
pub fn select_faces(
    raw: &[RawFace],
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Vec<FaceBox> {
    let mut faces: Vec<FaceBox> = raw
        .iter()
        .filter(|cell| cell.score.is_finite() && cell.score >= config.score_threshold)
        .filter(|cell| cell.width > 0.0 && cell.height > 0.0)
        .map(|cell| FaceBox {
            rect: Rect::new(
                cell.x * scale_x,
                cell.y * scale_y,
                cell.width * scale_x,
                cell.height * scale_y,
            ),
            score: cell.score,
        })
        .collect();

    faces.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    if config.top_k > 0 {
        faces.truncate(config.top_k);
    }
    if config.nms_threshold > 0.0 && faces.len() > 1 {
        faces = suppress_overlaps(faces, config.nms_threshold);
    }
    faces
}

fn suppress_overlaps(faces: Vec<FaceBox>, threshold: f32) -> Vec<FaceBox> {
    let mut kept: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept
            .iter()
            .all(|other| face.rect.iou(&other.rect) <= threshold)
        {
            kept.push(face);
        }
    }
    kept
}
