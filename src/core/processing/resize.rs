use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbaImage;
use tracing::info;

use crate::error::{Error, Result};

/// Which branch of the bounding policy applies to an image.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScaleDecision {
    /// Larger side lands on the upper bound.
    Downscale(f64),
    /// Smaller side lands on the lower bound.
    Upscale(f64),
    Keep,
}

impl ScaleDecision {
    pub fn factor(self) -> f64 {
        match self {
            ScaleDecision::Downscale(f) | ScaleDecision::Upscale(f) => f,
            ScaleDecision::Keep => 1.0,
        }
    }
}

/// Pick the uniform scale factor for `width`x`height` under `[min_side, max_side]`.
/// Oversized images are handled first, so an image that is both too long and too
/// thin is only downscaled.
pub fn decide_scale(width: u32, height: u32, min_side: u32, max_side: u32) -> ScaleDecision {
    let (w, h) = (f64::from(width), f64::from(height));
    let (lo, hi) = (f64::from(min_side), f64::from(max_side));

    if width > max_side || height > max_side {
        ScaleDecision::Downscale((hi / w).min(hi / h))
    } else if width < min_side || height < min_side {
        ScaleDecision::Upscale((lo / w).max(lo / h))
    } else {
        ScaleDecision::Keep
    }
}

/// Target dimensions after applying the bounding policy, each side rounded on its own.
pub fn calculate_normalized_dimensions(
    width: u32,
    height: u32,
    min_side: u32,
    max_side: u32,
) -> (u32, u32) {
    match decide_scale(width, height, min_side, max_side) {
        ScaleDecision::Keep => (width, height),
        decision => {
            let scale = decision.factor();
            (scale_side(width, scale), scale_side(height, scale))
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_side(side: u32, scale: f64) -> u32 {
    // Rounded value is positive and bounded by u32 inputs times a finite factor
    ((f64::from(side) * scale).round() as u32).max(1)
}

/// Resample an RGBA image with a Lanczos3 convolution.
pub fn resize_rgba_image(src: &RgbaImage, target_width: u32, target_height: u32) -> Result<RgbaImage> {
    if src.dimensions() == (target_width, target_height) {
        return Ok(src.clone());
    }

    info!(
        "Resizing {}x{} -> {}x{}",
        src.width(),
        src.height(),
        target_width,
        target_height
    );

    let resize_options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    let mut resizer = Resizer::new();

    let src_image = Image::from_vec_u8(
        src.width(),
        src.height(),
        src.as_raw().clone(),
        PixelType::U8x4,
    )
    .map_err(Error::resize)?;
    let mut dst_image = Image::new(target_width, target_height, PixelType::U8x4);
    resizer
        .resize(&src_image, &mut dst_image, &resize_options)
        .map_err(Error::resize)?;

    RgbaImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| Error::Resize("resized buffer has unexpected length".to_string()))
}
