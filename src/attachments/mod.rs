//! Uploaded image handling: base64 payload decoding and preprocessing before
//! the bytes are handed to the model.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use tracing::debug;

use crate::error::AssessError;

/// Decode a plain base64 string or a `data:<mime>;base64,<payload>` URI.
pub fn decode_base64_payload(raw: &str) -> Result<Vec<u8>, AssessError> {
    let trimmed = raw.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| AssessError::InvalidInput("data URI has no payload".into()))?,
        None => trimmed,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| AssessError::InvalidInput(format!("image payload is not valid base64: {e}")))
}

/// Turns raw upload bytes into the PNG that gets embedded in the prompt.
/// Face cropping or denoising can be layered in by another implementation.
pub trait ImagePreprocessor: Send + Sync {
    fn prepare(&self, bytes: &[u8]) -> Result<Vec<u8>, AssessError>;
}

/// Downscale to fit a square bound, never upscaling, then re-encode as PNG.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailPreprocessor {
    max_dimension: u32,
}

impl ThumbnailPreprocessor {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl ImagePreprocessor for ThumbnailPreprocessor {
    fn prepare(&self, bytes: &[u8]) -> Result<Vec<u8>, AssessError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| AssessError::UnsupportedUpload(format!("cannot decode image: {e}")))?;

        let (width, height) = image.dimensions();
        let image = if width > self.max_dimension || height > self.max_dimension {
            image.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
        } else {
            image
        };

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AssessError::Internal(format!("png encoding failed: {e}")))?;

        debug!(
            original_width = width,
            original_height = height,
            width = image.width(),
            height = image.height(),
            bytes = png.len(),
            "image preprocessed"
        );
        Ok(png)
    }
}
