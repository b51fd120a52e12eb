//! Rectangles tagged with the coordinate space they live in, and the mapping
//! between the rendered display surface and the image's natural pixel grid.
//!
//! The space marker is a zero-sized type parameter, so a display-space
//! rectangle cannot be handed to code expecting natural pixels without going
//! through [`CoordinateMapper`].

use std::marker::PhantomData;

use agelens_utils::PixelRegion;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Coordinates relative to the rendered, possibly scaled, image surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplaySpace;

/// Coordinates relative to the image's original pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NaturalSpace;

/// A point in coordinate space `S`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Point<S> {
    pub x: f32,
    pub y: f32,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S> Point<S> {
    pub const fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

/// Width and height of a surface in coordinate space `S`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Size<S> {
    pub width: f32,
    pub height: f32,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S> Size<S> {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            space: PhantomData,
        }
    }

    fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl Size<NaturalSpace> {
    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32)
    }
}

/// Axis-aligned rectangle in coordinate space `S`.
///
/// Width and height are never negative when built through
/// [`Rect::new`] or [`Rect::from_corners`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Rect<S> {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S> Rect<S> {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            space: PhantomData,
        }
    }

    /// Box spanning two corners given in any order.
    pub fn from_corners(a: Point<S>, b: Point<S>) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (b.x - a.x).abs(),
            (b.y - a.y).abs(),
        )
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over union with `other`.
    pub fn iou(&self, other: &Self) -> f32 {
        let w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let intersection = w * h;
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }

    /// Both sides strictly exceed `min_size`.
    pub fn meets_min_size(&self, min_size: f32) -> bool {
        self.width > min_size && self.height > min_size
    }

    /// All four fields rounded to the nearest integer.
    pub fn rounded(&self) -> Self {
        Self::new(
            self.x.round(),
            self.y.round(),
            self.width.round(),
            self.height.round(),
        )
    }

    /// Intersection with a `size`-sized surface anchored at the origin.
    pub fn clamp_to(&self, size: Size<S>) -> Option<Self> {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = self.right().min(size.width);
        let y1 = self.bottom().min(size.height);
        (x1 > x0 && y1 > y0).then(|| Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    fn scaled<T>(&self, sx: f32, sy: f32) -> Rect<T> {
        Rect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

impl Rect<NaturalSpace> {
    /// Integer pixel region covering this rectangle.
    pub fn to_pixel_region(&self) -> PixelRegion {
        let r = self.rounded();
        PixelRegion::new(r.x as i64, r.y as i64, r.width as u32, r.height as u32)
    }
}

/// Converts rectangles between display and natural space for one layout.
///
/// Build a fresh mapper whenever the display size changes; scale factors are
/// computed per axis and results are rounded to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale_x: f32,
    scale_y: f32,
}

impl CoordinateMapper {
    pub fn new(
        display: Size<DisplaySpace>,
        natural: Size<NaturalSpace>,
    ) -> Result<Self, AnalysisError> {
        if !display.is_usable() {
            return Err(AnalysisError::InvalidGeometry {
                width: display.width,
                height: display.height,
            });
        }
        if !natural.is_usable() {
            return Err(AnalysisError::InvalidGeometry {
                width: natural.width,
                height: natural.height,
            });
        }
        Ok(Self {
            scale_x: natural.width / display.width,
            scale_y: natural.height / display.height,
        })
    }

    pub fn to_natural(&self, rect: &Rect<DisplaySpace>) -> Rect<NaturalSpace> {
        rect.scaled(self.scale_x, self.scale_y).rounded()
    }

    pub fn to_display(&self, rect: &Rect<NaturalSpace>) -> Rect<DisplaySpace> {
        rect.scaled(1.0 / self.scale_x, 1.0 / self.scale_y).rounded()
    }
}

/// Map a display-space rectangle onto the natural pixel grid.
pub fn to_natural(
    rect: &Rect<DisplaySpace>,
    display: Size<DisplaySpace>,
    natural: Size<NaturalSpace>,
) -> Result<Rect<NaturalSpace>, AnalysisError> {
    Ok(CoordinateMapper::new(display, natural)?.to_natural(rect))
}

/// Map a natural-space rectangle onto the display surface.
pub fn to_display(
    rect: &Rect<NaturalSpace>,
    display: Size<DisplaySpace>,
    natural: Size<NaturalSpace>,
) -> Result<Rect<DisplaySpace>, AnalysisError> {
    Ok(CoordinateMapper::new(display, natural)?.to_display(rect))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(w: f32, h: f32) -> Size<DisplaySpace> {
        Size::new(w, h)
    }

    fn natural(w: f32, h: f32) -> Size<NaturalSpace> {
        Size::new(w, h)
    }

    #[test]
    fn projects_natural_box_onto_half_size_display() {
        let rect = Rect::<NaturalSpace>::new(100.0, 100.0, 200.0, 200.0);
        let mapped = to_display(&rect, display(400.0, 300.0), natural(800.0, 600.0)).unwrap();
        assert_eq!(mapped, Rect::new(50.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn scales_each_axis_independently() {
        let rect = Rect::<DisplaySpace>::new(10.0, 10.0, 50.0, 50.0);
        let mapped = to_natural(&rect, display(100.0, 200.0), natural(300.0, 200.0)).unwrap();
        assert_eq!(mapped, Rect::new(30.0, 10.0, 150.0, 50.0));
    }

    #[test]
    fn rounds_only_the_result() {
        // Rounding the input first would give 3.0 instead of 4.0.
        let rect = Rect::<DisplaySpace>::new(1.4, 1.4, 7.4, 7.4);
        let mapped = to_natural(&rect, display(300.0, 300.0), natural(900.0, 900.0)).unwrap();
        assert_eq!(mapped, Rect::new(4.0, 4.0, 22.0, 22.0));
    }

    #[test]
    fn round_trip_stays_within_a_pixel() {
        let sizes = [
            (display(400.0, 300.0), natural(800.0, 600.0)),
            (display(333.0, 517.0), natural(1920.0, 1080.0)),
            (display(1280.0, 720.0), natural(640.0, 480.0)),
        ];
        let rects = [
            Rect::<DisplaySpace>::new(0.0, 0.0, 21.0, 21.0),
            Rect::new(13.0, 57.0, 101.0, 33.0),
            Rect::new(250.0, 120.0, 80.0, 160.0),
        ];
        for (d, n) in sizes {
            let mapper = CoordinateMapper::new(d, n).unwrap();
            for rect in rects {
                let back = mapper.to_display(&mapper.to_natural(&rect));
                for (a, b) in [
                    (back.x, rect.x),
                    (back.y, rect.y),
                    (back.width, rect.width),
                    (back.height, rect.height),
                ] {
                    assert!((a - b).abs() <= 1.0, "{rect:?} -> {back:?} for {d:?}/{n:?}");
                }
            }
        }
    }

    #[test]
    fn zero_display_dimension_is_invalid_geometry() {
        let rect = Rect::<DisplaySpace>::new(0.0, 0.0, 30.0, 30.0);
        let err = to_natural(&rect, display(0.0, 300.0), natural(800.0, 600.0)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InvalidGeometry {
                width: 0.0,
                height: 300.0
            }
        );
        assert!(CoordinateMapper::new(display(400.0, -1.0), natural(800.0, 600.0)).is_err());
        assert!(CoordinateMapper::new(display(f32::NAN, 1.0), natural(800.0, 600.0)).is_err());
    }

    #[test]
    fn from_corners_normalizes_every_direction() {
        let expected = Rect::<DisplaySpace>::new(30.0, 20.0, 20.0, 30.0);
        let corners = [
            (Point::new(50.0, 50.0), Point::new(30.0, 20.0)),
            (Point::new(30.0, 20.0), Point::new(50.0, 50.0)),
            (Point::new(50.0, 20.0), Point::new(30.0, 50.0)),
            (Point::new(30.0, 50.0), Point::new(50.0, 20.0)),
        ];
        for (a, b) in corners {
            assert_eq!(Rect::from_corners(a, b), expected);
        }
    }

    #[test]
    fn min_size_is_strict() {
        assert!(!Rect::<DisplaySpace>::new(0.0, 0.0, 20.0, 40.0).meets_min_size(20.0));
        assert!(!Rect::<DisplaySpace>::new(0.0, 0.0, 40.0, 20.0).meets_min_size(20.0));
        assert!(Rect::<DisplaySpace>::new(0.0, 0.0, 21.0, 21.0).meets_min_size(20.0));
    }

    #[test]
    fn clamp_to_trims_or_rejects() {
        let frame = natural(100.0, 80.0);
        let rect = Rect::<NaturalSpace>::new(-10.0, 60.0, 50.0, 50.0);
        assert_eq!(rect.clamp_to(frame), Some(Rect::new(0.0, 60.0, 40.0, 20.0)));
        assert_eq!(Rect::<NaturalSpace>::new(120.0, 0.0, 10.0, 10.0).clamp_to(frame), None);
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = Rect::<NaturalSpace>::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::<NaturalSpace>::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn serializes_without_space_marker() {
        let rect = Rect::<NaturalSpace>::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_value(rect).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0 })
        );
    }
}
