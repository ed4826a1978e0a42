use std::path::Path;

use image::{ImageFormat, ImageReader};
use tracing::info;

use crate::core::params::CANVAS_SIDE;
use crate::core::processing::composite::{blank_mask, compose_centered};
use crate::core::processing::save::save_validated_png;
use crate::error::{Error, Result};
use crate::io::writers::png::write_rgba_png;
use crate::types::{CompositeArtifact, MaskArtifact, NormalizedImage};

pub const COMPOSITE_LABEL: &str = "composite";

/// Center both normalized images on the white canvas (`first` drawn before `second`)
/// and write the base image to `output`. When `mask_output` is given, also write a
/// fully transparent mask of the same size there.
pub fn build_composite(
    first: &NormalizedImage,
    second: &NormalizedImage,
    output: &Path,
    mask_output: Option<&Path>,
    max_bytes: u64,
) -> Result<(CompositeArtifact, Option<MaskArtifact>)> {
    info!("Creating base image...");

    let first_img = load_normalized(first, "car1")?;
    let second_img = load_normalized(second, "car2")?;
    let canvas = compose_centered(&[("car1", &first_img), ("car2", &second_img)], CANVAS_SIDE)?;

    let size_bytes = save_validated_png(&canvas, output, COMPOSITE_LABEL, max_bytes)?;
    let composite = CompositeArtifact {
        path: output.to_path_buf(),
        width: canvas.width(),
        height: canvas.height(),
        format: ImageFormat::Png,
        size_bytes,
    };

    let mask = match mask_output {
        Some(mask_path) => {
            let mask = blank_mask(CANVAS_SIDE);
            write_rgba_png(mask_path, &mask).map_err(|source| Error::ImageEncode {
                label: "mask".to_string(),
                source,
            })?;
            info!("Mask written: {}x{}", mask.width(), mask.height());
            Some(MaskArtifact {
                path: mask_path.to_path_buf(),
                width: mask.width(),
                height: mask.height(),
            })
        }
        None => None,
    };

    Ok((composite, mask))
}

fn load_normalized(img: &NormalizedImage, label: &str) -> Result<image::RgbaImage> {
    let decoded = ImageReader::open(&img.path)?
        .with_guessed_format()?
        .decode()
        .map_err(|source| Error::ImageDecode {
            label: label.to_string(),
            source,
        })?;
    Ok(decoded.to_rgba8())
}
