use std::time::Duration;

use thiserror::Error;

/// Failures surfaced from an analysis cycle.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("cannot map coordinates onto a {width}x{height} surface")]
    InvalidGeometry { width: f32, height: f32 },

    #[error("No faces detected")]
    NoFacesDetected,

    #[error("Click and drag to select a face in the image")]
    SelectionRequired,

    #[error("no image loaded")]
    NoFrame,

    #[error("An error occurred during face analysis: {0}")]
    Detector(String),
}

/// Why the remote estimate collaborator produced nothing usable.
///
/// These never leave the fallback chain.
#[derive(Debug, Error)]
pub enum RemoteEstimateError {
    #[error("no remote estimate endpoint configured")]
    Disabled,

    #[error("remote estimate request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote estimate endpoint answered with HTTP {0}")]
    Status(u16),

    #[error("remote estimate response is malformed: {0}")]
    Parse(String),

    #[error("remote estimate did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode selection for upload: {0}")]
    Encode(String),

    #[error("remote estimate returned no results")]
    Empty,
}
