use std::path::Path;

use image::{ImageFormat, ImageReader};
use tracing::info;

use crate::core::params::{MAX_SIDE, MIN_SIDE};
use crate::core::processing::resize::{calculate_normalized_dimensions, resize_rgba_image};
use crate::core::processing::save::save_validated_png;
use crate::error::{Error, Result};
use crate::types::NormalizedImage;

/// Decode `source`, bring it within the side bounds with one uniform scale factor,
/// and write it to `output` as PNG. Fails if the encoded file is over `max_bytes`.
///
/// The source format is sniffed from content, so staged uploads without an
/// extension decode fine.
pub fn normalize_image(
    source: &Path,
    output: &Path,
    label: &str,
    max_bytes: u64,
) -> Result<NormalizedImage> {
    info!("Processing {}...", label);

    let decoded = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|source| Error::ImageDecode {
            label: label.to_string(),
            source,
        })?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let (target_width, target_height) =
        calculate_normalized_dimensions(width, height, MIN_SIDE, MAX_SIDE);
    info!(
        "{}: original {}x{}, normalized {}x{}",
        label, width, height, target_width, target_height
    );

    let resized = resize_rgba_image(&rgba, target_width, target_height)?;
    let size_bytes = save_validated_png(&resized, output, label, max_bytes)?;

    Ok(NormalizedImage {
        path: output.to_path_buf(),
        width: target_width,
        height: target_height,
        format: ImageFormat::Png,
        size_bytes,
    })
}
