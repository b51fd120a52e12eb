//! Draw analysis results onto a copy of the source image.

use std::{
    fs,
    path::{Path, PathBuf},
};

use agelens_core::{AnalysisResult, ImageFrame, Size};
use agelens_session::{OverlayShape, OverlayStyle, ResultRenderer};
use anyhow::{Context, Result};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

/// Glyphs are 8x8; draw them at twice that so labels stay legible.
const GLYPH_SCALE: u32 = 2;

/// Render `result` over `frame` and save it into `output_dir` under the
/// source file name.
pub fn annotate_result(
    frame: &ImageFrame,
    result: &AnalysisResult,
    source_path: &Path,
    output_dir: &Path,
) -> Result<PathBuf> {
    let natural = frame.natural_size();
    // Annotations are drawn at natural resolution, so display == natural.
    let shapes =
        ResultRenderer::project(result, Size::new(natural.width, natural.height), natural)?;
    let mut image = frame.pixels().clone();
    let style = OverlayStyle::default();
    for shape in &shapes {
        draw_shape(&mut image, shape, &style);
    }

    let file_name = source_path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("frame.png"));
    let output_path = output_dir.join(file_name);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(&output_path)
        .with_context(|| format!("failed to save annotated image {}", output_path.display()))?;
    Ok(output_path)
}

pub fn draw_shape(image: &mut RgbImage, shape: &OverlayShape, style: &OverlayStyle) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }

    let stroke = style.stroke_width.round().max(1.0) as i32;
    for inset in 0..stroke {
        if let Some(rect) = pixel_rect(
            shape.rect.x + inset as f32,
            shape.rect.y + inset as f32,
            shape.rect.width - 2.0 * inset as f32,
            shape.rect.height - 2.0 * inset as f32,
            img_w,
            img_h,
        ) {
            draw_hollow_rect_mut(image, rect, Rgb(style.box_rgb));
        }
    }

    let band = shape.label_band;
    blend_rect(
        image,
        band.x.round() as i64,
        band.y.round() as i64,
        band.width.round().max(0.0) as u32,
        band.height.round().max(0.0) as u32,
        style.band_rgba,
    );

    let glyph_height = (8 * GLYPH_SCALE) as f32;
    draw_text(
        image,
        shape.label_origin.x.round() as i64,
        (shape.label_origin.y - glyph_height).round() as i64,
        &shape.label,
        Rgb(style.text_rgb),
    );
}

/// Convert a float rectangle to an `imageproc` rectangle clipped to the image.
fn pixel_rect(x: f32, y: f32, width: f32, height: f32, img_w: u32, img_h: u32) -> Option<Rect> {
    if width < 1.0 || height < 1.0 {
        return None;
    }
    let max_x = (img_w - 1) as f32;
    let max_y = (img_h - 1) as f32;
    let x1 = x.clamp(0.0, max_x);
    let y1 = y.clamp(0.0, max_y);
    let x2 = (x + width).clamp(0.0, max_x);
    let y2 = (y + height).clamp(0.0, max_y);
    let w = (x2 - x1).round().max(1.0) as u32;
    let h = (y2 - y1).round().max(1.0) as u32;
    Some(Rect::at(x1.round() as i32, y1.round() as i32).of_size(w, h))
}

fn blend_rect(image: &mut RgbImage, x: i64, y: i64, width: u32, height: u32, rgba: [u8; 4]) {
    let (img_w, img_h) = image.dimensions();
    let alpha = f32::from(rgba[3]) / 255.0;
    let x0 = x.clamp(0, i64::from(img_w)) as u32;
    let y0 = y.clamp(0, i64::from(img_h)) as u32;
    let x1 = (x + i64::from(width)).clamp(0, i64::from(img_w)) as u32;
    let y1 = (y + i64::from(height)).clamp(0, i64::from(img_h)) as u32;
    for py in y0..y1 {
        for px in x0..x1 {
            let pixel = image.get_pixel_mut(px, py);
            for (channel, overlay) in pixel.0.iter_mut().zip(rgba) {
                let mixed = f32::from(*channel) * (1.0 - alpha) + f32::from(overlay) * alpha;
                *channel = mixed.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    let (img_w, img_h) = image.dimensions();
    let advance = i64::from(8 * GLYPH_SCALE);
    for (index, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = x + index as i64 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let px = origin_x + i64::from(col * GLYPH_SCALE + dx);
                        let py = y + row as i64 * i64::from(GLYPH_SCALE) + i64::from(dy);
                        if (0..i64::from(img_w)).contains(&px)
                            && (0..i64::from(img_h)).contains(&py)
                        {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}
