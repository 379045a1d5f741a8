use std::path::Path;

use image::imageops::FilterType;
use thiserror::Error;

/// Per-item recoverable error: the worker skips the offending triplet and
/// keeps pulling.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("failed decoding image {name}: {source}")]
    Decode {
        name: String,
        source: image::ImageError,
    },
}

/// Number of f32 values in a model-ready tensor for a square RGB image.
pub fn tensor_len(size: u32) -> usize {
    3 * (size as usize) * (size as usize)
}

/// Load one image and normalize it into model-ready CHW f32 data.
///
/// Resizes to `size x size`, converts to RGB, and scales each channel to
/// `[-1, 1]`.
pub fn load_image_tensor(
    image_dir: &Path,
    image_name: &str,
    size: u32,
) -> Result<Vec<f32>, CodecError> {
    let path = image_dir.join(image_name);
    if !path.exists() {
        return Err(CodecError::NotFound(image_name.to_string()));
    }
    let decoded = image::open(&path).map_err(|source| CodecError::Decode {
        name: image_name.to_string(),
        source,
    })?;
    let rgb = decoded
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let side = size as usize;
    let plane = side * side;
    let mut data = vec![0.0f32; 3 * plane];
    for (y, row) in rgb.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            for channel in 0..3 {
                data[channel * plane + y * side + x] = f32::from(pixel[channel]) / 127.5 - 1.0;
            }
        }
    }
    Ok(data)
}
