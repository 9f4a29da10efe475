use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::encoding::EncodedImage;
use crate::error::EncodeError;

pub const DEFAULT_QUALITY: f32 = 0.85;

/// Serializes raster surfaces into JPEG stills. Holds only the quality setting.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: f32,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder {
    pub fn new(quality: f32) -> Self {
        Self { quality }
    }

    pub fn encode(&self, surface: &RgbImage) -> Result<EncodedImage, EncodeError> {
        encode(surface, self.quality)
    }
}

/// Maps a `0.0..=1.0` quality onto the JPEG `1..=100` scale.
fn jpeg_quality(quality: f32) -> u8 {
    if !quality.is_finite() {
        return (DEFAULT_QUALITY * 100.0) as u8;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

pub fn encode(surface: &RgbImage, quality: f32) -> Result<EncodedImage, EncodeError> {
    let mut buffer = Vec::with_capacity(surface.as_raw().len() / 8);
    let encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality));
    surface.write_with_encoder(encoder)?;
    Ok(EncodedImage::jpeg(buffer))
}
