//! Normalized detection records produced by every estimation path.

use std::fmt;

use agelens_utils::config::FallbackSettings;
use serde::{Deserialize, Serialize};

use crate::geometry::{NaturalSpace, Rect};

pub const MIN_AGE: f32 = 0.0;
pub const MAX_AGE: f32 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    /// Lenient parse used for collaborator payloads; anything unrecognized is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "man" => Gender::Male,
            "female" | "f" | "woman" => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }

    /// Label form with a leading capital, e.g. `Female`.
    pub fn capitalized(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which estimation path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    Model,
    ModelRelaxed,
    RemoteEstimate,
    ManualFallback,
}

impl DetectionSource {
    /// Records from the remote collaborator or the synthesized fallback are estimates.
    pub fn is_estimate(&self) -> bool {
        matches!(
            self,
            DetectionSource::RemoteEstimate | DetectionSource::ManualFallback
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Model => "model",
            DetectionSource::ModelRelaxed => "model-relaxed",
            DetectionSource::RemoteEstimate => "remote-estimate",
            DetectionSource::ManualFallback => "manual-fallback",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw age/gender attributes as reported by a model or collaborator.
///
/// Any field may be missing; [`DetectionRecord::new`] fills the gaps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AgeGender {
    pub age: Option<f32>,
    pub gender: Option<Gender>,
    pub gender_probability: Option<f32>,
}

impl AgeGender {
    pub fn new(age: f32, gender: Gender, gender_probability: f32) -> Self {
        Self {
            age: Some(age),
            gender: Some(gender),
            gender_probability: Some(gender_probability),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub age: f32,
    pub gender: Gender,
    pub gender_probability: f32,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: Rect<NaturalSpace>,
    pub source: DetectionSource,
    pub is_estimate: bool,
}

impl DetectionRecord {
    /// Build a record, substituting `defaults` for missing or non-finite
    /// attributes and clamping age to `[0, 120]` and probabilities to `[0, 1]`.
    pub fn new(
        attributes: AgeGender,
        confidence: f32,
        bbox: Rect<NaturalSpace>,
        source: DetectionSource,
        defaults: &FallbackSettings,
    ) -> Self {
        let age = attributes
            .age
            .filter(|age| age.is_finite())
            .unwrap_or(defaults.age);
        let gender_probability = attributes
            .gender_probability
            .filter(|p| p.is_finite())
            .unwrap_or(defaults.gender_probability);
        Self {
            age: clamp_age(age),
            gender: attributes.gender.unwrap_or_default(),
            gender_probability: clamp_unit(gender_probability),
            confidence: clamp_unit(confidence),
            bbox,
            source,
            is_estimate: source.is_estimate(),
        }
    }

    /// The fixed record used when every other manual tier has failed.
    pub fn synthesized(bbox: Rect<NaturalSpace>, defaults: &FallbackSettings) -> Self {
        Self::new(
            AgeGender {
                age: Some(defaults.age),
                gender: Some(Gender::Unknown),
                gender_probability: Some(defaults.gender_probability),
            },
            defaults.confidence,
            bbox,
            DetectionSource::ManualFallback,
            defaults,
        )
    }

    pub fn rounded_age(&self) -> u32 {
        self.age.round() as u32
    }

    /// Overlay caption, e.g. `Age: 31 Gender: Female`.
    pub fn label(&self) -> String {
        format!(
            "Age: {} Gender: {}",
            self.rounded_age(),
            self.gender.capitalized()
        )
    }

    /// Multi-line human readable description of face number `index` (0-based).
    pub fn summary(&self, index: usize) -> String {
        let position = self.bbox.rounded();
        let mut text = format!(
            "Face #{}\n  Age: {} years\n  Gender: {} ({:.1}%)\n  Confidence: {:.1}%\n  Position: x={}, y={}, width={}, height={}\n  Source: {}",
            index + 1,
            self.rounded_age(),
            self.gender.capitalized(),
            self.gender_probability * 100.0,
            self.confidence * 100.0,
            position.x,
            position.y,
            position.width,
            position.height,
            self.source,
        );
        if self.is_estimate {
            text.push_str("\n  Note: estimated result, accuracy may be limited");
        }
        text
    }
}

/// The records of one analysis cycle, in detector order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub records: Vec<DetectionRecord>,
}

impl AnalysisResult {
    pub fn new(records: Vec<DetectionRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DetectionRecord> {
        self.records.iter()
    }

    /// True when any record came from an estimate path.
    pub fn is_estimate(&self) -> bool {
        self.records.iter().any(|record| record.is_estimate)
    }
}

impl<'a> IntoIterator for &'a AnalysisResult {
    type Item = &'a DetectionRecord;
    type IntoIter = std::slice::Iter<'a, DetectionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn clamp_age(age: f32) -> f32 {
    age.clamp(MIN_AGE, MAX_AGE)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
