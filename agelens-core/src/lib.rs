//! Face analysis primitives for agelens.
//!
//! This crate maps rectangles between display and natural pixel space, runs
//! the YuNet face detector and an age/gender head with `tract-onnx`, and
//! drives the detection fallback chain used for automatic and
//! manual-selection analysis.

/// Age/gender attribute model.
pub mod age_gender;
/// Automatic detection and manual-selection fallback tiers.
pub mod chain;
/// Detector capability trait and the ONNX implementation.
pub mod detector;
pub mod error;
/// YuNet face box model.
pub mod face_model;
pub mod frame;
/// Display/natural coordinate spaces.
pub mod geometry;
mod onnx;
/// Score filtering and non-maximum suppression.
pub mod postprocess;
/// Detector input preparation.
pub mod preprocess;
pub mod record;
/// Remote estimate collaborator.
pub mod remote;

pub use age_gender::AgeGenderModel;
pub use chain::{ChainSettings, DetectionFallbackChain, MANUAL_TIERS, ManualTier};
pub use detector::{DetectOptions, FaceAnalysis, FaceAnalyzer, FaceStack};
pub use error::{AnalysisError, RemoteEstimateError};
pub use face_model::FaceModel;
pub use frame::ImageFrame;
pub use geometry::{
    CoordinateMapper, DisplaySpace, NaturalSpace, Point, Rect, Size, to_display, to_natural,
};
pub use postprocess::{FaceBox, PostprocessConfig, RawFace, select_faces};
pub use preprocess::{InputSize, PreprocessConfig, PreprocessOutput, preprocess_rgb};
pub use record::{AgeGender, AnalysisResult, DetectionRecord, DetectionSource, Gender};
pub use remote::{HttpRemoteEstimator, RemoteEstimate, RemoteEstimator};
