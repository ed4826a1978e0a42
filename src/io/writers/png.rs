use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageResult, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encode an RGBA image as PNG with maximum compression.
pub fn write_rgba_png(output: &Path, img: &RgbaImage) -> ImageResult<()> {
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    encode_rgba_png(&mut writer, img)?;
    writer.flush()?;
    Ok(())
}

/// Same encoding as [`write_rgba_png`], into any writer.
pub fn encode_rgba_png<W: Write>(writer: W, img: &RgbaImage) -> ImageResult<()> {
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
}
