//! Image feature extraction
//!
//! Turns an album-cover raster into the flattened grayscale intensity
//! vector consumed by the query-by-image engine, and canonicalizes
//! uploads to PNG. The grayscale/resize arithmetic is fixed: BT.601 luma
//! over 16-bit samples truncated to bytes, nearest-neighbor sampling
//! with integer division. Feature files produced from the same input are
//! byte-identical.

use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};
use thiserror::Error;

/// Errors from decoding, converting, or storing image features.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported image container: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid feature artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Grayscale raster with byte intensities, row-major.
struct GrayRaster {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl GrayRaster {
    fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

fn is_supported_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::WebP
            | ImageFormat::Bmp
            | ImageFormat::Tiff
    )
}

fn decode_image(path: &Path) -> Result<image::DynamicImage, ImageError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ImageError::Format("unknown".to_string()))?;
    if !is_supported_format(format) {
        return Err(ImageError::Format(format!("{:?}", format)));
    }
    Ok(reader.decode()?)
}

/// BT.601 grayscale over 16-bit channel samples, truncated to bytes.
fn to_grayscale(img: &image::DynamicImage) -> GrayRaster {
    let rgba = img.to_rgba16();
    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    let mut pixels = Vec::with_capacity(width * height);

    for pixel in rgba.pixels() {
        let [r, g, b, _] = pixel.0;
        let luma = 0.2989 * r as f64 + 0.5870 * g as f64 + 0.1140 * b as f64;
        pixels.push((luma / 256.0) as u8);
    }

    GrayRaster {
        width,
        height,
        pixels,
    }
}

/// Nearest-neighbor resize with integer-division source sampling.
fn resize_nearest(src: &GrayRaster, width: usize, height: usize) -> GrayRaster {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let src_x = x * src.width / width;
            let src_y = y * src.height / height;
            pixels.push(src.get(src_x, src_y));
        }
    }
    GrayRaster {
        width,
        height,
        pixels,
    }
}

/// Decode an image and reduce it to a `width * height` vector of byte
/// intensities in [0, 255], row-major, as `f64`.
pub fn preprocess_image(path: &Path, width: usize, height: usize) -> Result<Vec<f64>, ImageError> {
    let img = decode_image(path)?;
    let resized = resize_nearest(&to_grayscale(&img), width, height);
    Ok(resized.pixels.into_iter().map(f64::from).collect())
}

/// Re-encode an image as PNG next to the original, returning the new
/// path. The original file is left in place for the caller to remove.
pub fn convert_to_png(path: &Path) -> Result<PathBuf, ImageError> {
    let img = decode_image(path)?;
    let png_path = path.with_extension("png");
    img.save_with_format(&png_path, ImageFormat::Png)?;
    Ok(png_path)
}

/// Persist a flattened intensity vector as a JSON array of floats.
pub fn write_feature_vector(path: &Path, vector: &[f64]) -> Result<(), ImageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(vector)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Parse a flattened intensity vector from feature-artifact bytes.
pub fn parse_feature_vector(bytes: &[u8]) -> Result<Vec<f64>, ImageError> {
    Ok(serde_json::from_slice(bytes)?)
}
