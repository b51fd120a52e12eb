//! Overlay geometry for detection records on the display surface.

use agelens_core::{
    AnalysisError, AnalysisResult, CoordinateMapper, DetectionSource, DisplaySpace, NaturalSpace,
    Point, Rect, Size,
};
use serde::Serialize;

/// Height of the caption band drawn above each box.
pub const LABEL_BAND_HEIGHT: f32 = 30.0;
/// Caption baseline offset from the band's left edge and the box top.
pub const LABEL_INSET: (f32, f32) = (5.0, 10.0);

/// Colors and stroke shared by every overlay consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub box_rgb: [u8; 3],
    pub stroke_width: f32,
    pub band_rgba: [u8; 4],
    pub text_rgb: [u8; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_rgb: [13, 202, 240],
            stroke_width: 3.0,
            band_rgba: [0, 0, 0, 178],
            text_rgb: [255, 255, 255],
        }
    }
}

/// One drawable box plus its caption, in display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayShape {
    pub rect: Rect<DisplaySpace>,
    pub label: String,
    pub label_band: Rect<DisplaySpace>,
    pub label_origin: Point<DisplaySpace>,
    pub source: DetectionSource,
    pub is_estimate: bool,
}

/// Projects analysis results onto the current display layout.
pub struct ResultRenderer;

impl ResultRenderer {
    /// Map every record's box to display space and attach its caption.
    ///
    /// Called again on every layout change; records are never re-detected.
    pub fn project(
        results: &AnalysisResult,
        display: Size<DisplaySpace>,
        natural: Size<NaturalSpace>,
    ) -> Result<Vec<OverlayShape>, AnalysisError> {
        let mapper = CoordinateMapper::new(display, natural)?;
        Ok(results
            .iter()
            .map(|record| {
                let rect = mapper.to_display(&record.bbox);
                OverlayShape {
                    rect,
                    label: record.label(),
                    label_band: Rect::new(
                        rect.x,
                        rect.y - LABEL_BAND_HEIGHT,
                        rect.width,
                        LABEL_BAND_HEIGHT,
                    ),
                    label_origin: Point::new(rect.x + LABEL_INSET.0, rect.y - LABEL_INSET.1),
                    source: record.source,
                    is_estimate: record.is_estimate,
                }
            })
            .collect())
    }
}
