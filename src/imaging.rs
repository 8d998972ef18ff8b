//! Image post-processing: decode, aspect-preserving resize and PNG encode.
//!
//! All functions here are CPU-bound; async callers run them through
//! `tokio::task::spawn_blocking`.
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};

use crate::error::{AppError, AppResult};

pub fn decode(bytes: &[u8]) -> AppResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(AppError::Decode)
}

pub fn encode_png(image: &DynamicImage) -> AppResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(AppError::Encode)?;
    Ok(buf.into_inner())
}

/// Height that keeps the aspect ratio at `target_width`.
///
/// Truncates toward zero rather than rounding, and never returns 0.
pub fn target_height(width: u32, height: u32, target_width: u32) -> u32 {
    let aspect_ratio = width as f64 / height as f64;
    let new_height = (target_width as f64 / aspect_ratio) as u32;
    new_height.max(1)
}

/// Reject output dimensions whose pixel count exceeds `max_pixels`.
pub fn check_output_size(width: u32, height: u32, max_pixels: u64) -> AppResult<()> {
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(AppError::OutputTooLarge { width, height, max_pixels });
    }
    Ok(())
}

/// Resize an already decoded image to `target_width` using Lanczos3.
///
/// The output buffer is never allocated when it would exceed `max_pixels`.
pub fn resize_image(image: &DynamicImage, target_width: u32, max_pixels: u64) -> AppResult<DynamicImage> {
    let (width, height) = image.dimensions();
    let new_height = target_height(width, height, target_width);
    check_output_size(target_width, new_height, max_pixels)?;
    tracing::debug!(width, height, target_width, new_height, "Resizing image");
    Ok(image.resize_exact(target_width, new_height, FilterType::Lanczos3))
}

/// Decode `bytes`, resize to `target_width` and re-encode as PNG.
pub fn resize(bytes: &[u8], target_width: u32, max_pixels: u64) -> AppResult<Vec<u8>> {
    let decoded = decode(bytes)?;
    encode_png(&resize_image(&decoded, target_width, max_pixels)?)
}
