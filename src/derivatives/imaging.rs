//! Pure image operations: decode, orient, resize, re-encode.
//!
//! Nothing here touches storage, so every function is testable on in-memory images.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

use super::DerivativeError;

/// Decode an uploaded image and apply its EXIF orientation.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DerivativeError> {
    let img = image::load_from_memory(bytes).map_err(DerivativeError::Decode)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(DerivativeError::EmptyImage);
    }
    Ok(apply_orientation(img, read_orientation(bytes)))
}

/// EXIF orientation tag (1-8), or 1 when absent or unreadable.
fn read_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        3 => img.rotate180(),
        6 => img.rotate90(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// JPEG only carries greyscale or RGB; everything else is flattened to RGB.
fn jpeg_compatible(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Dimensions after shrinking to at most `max_width`, keeping the aspect ratio.
/// Images already narrow enough keep their size.
pub fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    (max_width, scaled_height(width, height, max_width))
}

/// Height matching `target_width` for a `width`x`height` source, never below 1.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let h = (height as f64 * target_width as f64 / width as f64).round() as u32;
    h.max(1)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, DerivativeError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(DerivativeError::Encode)?;
    Ok(buf)
}

/// Proportionally shrink to `max_width` (never upscale) and re-encode as JPEG.
pub fn resized_jpeg(
    img: &DynamicImage,
    max_width: u32,
    quality: u8,
) -> Result<Vec<u8>, DerivativeError> {
    let img = jpeg_compatible(img);
    let (w, h) = fit_width(img.width(), img.height(), max_width);
    if (w, h) == (img.width(), img.height()) {
        return encode_jpeg(&img, quality);
    }
    let resized = img.resize_exact(w, h, FilterType::Lanczos3);
    encode_jpeg(&resized, quality)
}

/// Tiny JPEG, exactly `width` pixels wide, as a `data:` URL.
pub fn blur_data_url(
    img: &DynamicImage,
    width: u32,
    quality: u8,
) -> Result<String, DerivativeError> {
    let img = jpeg_compatible(img);
    let height = scaled_height(img.width(), img.height(), width);
    let tiny = img.resize_exact(width, height, FilterType::Triangle);
    let jpeg = encode_jpeg(&tiny, quality)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
    Ok(format!("data:image/jpeg;base64,{}", encoded))
}
