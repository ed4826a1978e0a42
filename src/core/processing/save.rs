use std::path::Path;

use image::{ImageFormat, ImageReader, RgbaImage};
use tracing::info;

use crate::error::{Error, Result};
use crate::io::writers::png::write_rgba_png;

/// Write `img` as PNG, then enforce the encoded size limit and confirm the file
/// decodes back as a PNG of the same dimensions. Returns the encoded size.
pub fn save_validated_png(img: &RgbaImage, output: &Path, label: &str, max_bytes: u64) -> Result<u64> {
    write_rgba_png(output, img).map_err(|source| Error::ImageEncode {
        label: label.to_string(),
        source,
    })?;

    let size = std::fs::metadata(output)?.len();
    info!("{} encoded size: {} bytes", label, size);
    if size > max_bytes {
        return Err(Error::SizeLimit {
            label: label.to_string(),
            size,
            limit: max_bytes,
        });
    }

    let (format, width, height) = probe_image(output, label)?;
    if format != Some(ImageFormat::Png) || (width, height) != img.dimensions() {
        return Err(Error::Validation(format!(
            "{label} did not re-read as a {}x{} PNG",
            img.width(),
            img.height()
        )));
    }
    info!("{} validated: png, {}x{}", label, width, height);

    Ok(size)
}

/// Sniff the format from content and read dimensions without decoding pixels.
pub fn probe_image(path: &Path, label: &str) -> Result<(Option<ImageFormat>, u32, u32)> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions().map_err(|source| Error::ImageDecode {
        label: label.to_string(),
        source,
    })?;
    Ok((format, width, height))
}
