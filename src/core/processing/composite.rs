use image::{Rgba, RgbaImage, imageops};
use tracing::info;

use crate::error::{Error, Result};

/// Opaque white canvas background.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Top-left offset that centers `extent` on `canvas`, rounded half away from zero.
#[allow(clippy::cast_possible_truncation)]
pub fn center_offset(canvas: u32, extent: u32) -> i64 {
    ((f64::from(canvas) - f64::from(extent)) / 2.0).round() as i64
}

/// Draw each layer centered on a square white canvas, in order. Later layers are
/// alpha-blended over earlier ones where they overlap.
pub fn compose_centered(layers: &[(&str, &RgbaImage)], canvas_side: u32) -> Result<RgbaImage> {
    let mut canvas = RgbaImage::from_pixel(canvas_side, canvas_side, BACKGROUND);

    for (label, layer) in layers {
        let (width, height) = layer.dimensions();
        if width > canvas_side || height > canvas_side {
            return Err(Error::ExceedsCanvas {
                label: (*label).to_string(),
                width,
                height,
                canvas: canvas_side,
            });
        }

        let left = center_offset(canvas_side, width);
        let top = center_offset(canvas_side, height);
        info!(
            "Placing {}: {}x{} at top={}, left={}",
            label, width, height, top, left
        );
        imageops::overlay(&mut canvas, *layer, left, top);
    }

    Ok(canvas)
}

/// Zero-filled RGBA buffer: every pixel fully transparent.
pub fn blank_mask(side: u32) -> RgbaImage {
    RgbaImage::new(side, side)
}
