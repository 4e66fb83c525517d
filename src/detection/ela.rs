//! Error Level Analysis.
//!
//! A JPEG resave at a fixed quality changes untouched areas of an already
//! compressed document only slightly; pasted or edited areas carry a
//! different compression history and show up as brighter error levels.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Heatmap and score produced for one image
#[derive(Debug, Clone)]
pub struct ElaOutcome {
    pub heatmap: RgbImage,
    pub score: f64,
}

/// Encode as JPEG at `quality` in memory and decode the result
pub fn recompress_jpeg(rgb: &RgbImage, quality: u8) -> Result<RgbImage> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(rgb)
        .context("Failed to encode JPEG for error level analysis")?;

    let resaved = image::load_from_memory_with_format(&buffer, ImageFormat::Jpeg)
        .context("Failed to decode resaved JPEG")?;
    Ok(resaved.to_rgb8())
}

/// Per-channel absolute difference of two equally sized images
pub fn error_levels(original: &RgbImage, resaved: &RgbImage) -> Result<RgbImage> {
    if original.dimensions() != resaved.dimensions() {
        anyhow::bail!(
            "Image size mismatch: {:?} vs {:?}",
            original.dimensions(),
            resaved.dimensions()
        );
    }

    let (width, height) = original.dimensions();
    let raw: Vec<u8> = original
        .as_raw()
        .iter()
        .zip(resaved.as_raw())
        .map(|(a, b)| a.abs_diff(*b))
        .collect();

    RgbImage::from_raw(width, height, raw).context("Difference buffer has unexpected length")
}

/// Largest channel value (never below 1, so it can be used as a divisor)
pub fn max_difference(diff: &RgbImage) -> u8 {
    diff.as_raw().iter().copied().max().unwrap_or(0).max(1)
}

/// Stretch the difference map so its brightest channel reaches 255
pub fn amplify(diff: &RgbImage) -> RgbImage {
    let scale = 255.0 / max_difference(diff) as f64;
    let mut amplified = diff.clone();
    for value in amplified.iter_mut() {
        *value = (*value as f64 * scale).min(255.0) as u8;
    }
    amplified
}

/// Population variance of all channel values, divided by 100
pub fn anomaly_score(amplified: &RgbImage) -> f64 {
    let raw = amplified.as_raw();
    if raw.is_empty() {
        return 0.0;
    }

    let n = raw.len() as f64;
    let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = raw
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    variance / 100.0
}

/// Run the whole analysis without the pipeline machinery
pub fn analyze_error_levels(image: &DynamicImage, quality: u8) -> Result<ElaOutcome> {
    let original = image.to_rgb8();
    let resaved = recompress_jpeg(&original, quality)?;
    let diff = error_levels(&original, &resaved)?;
    let heatmap = amplify(&diff);
    let score = anomaly_score(&heatmap);
    Ok(ElaOutcome { heatmap, score })
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(buffer.into_inner())
}
