use super::ImageEncoder;
use crate::config::OutputFormat;
use crate::error::EncodeError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Decodes with the `image` crate; encodes JPEG with `image` and lossy WebP
/// with libwebp
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    format: OutputFormat,
}

impl ImageCodec {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn write(&self, img: &DynamicImage, quality: u8) -> Result<Bytes, EncodeError> {
        match self.format {
            OutputFormat::Webp => {
                // libwebp only takes 8-bit RGB or RGBA buffers
                let encoder = webp::Encoder::from_image(img)
                    .map_err(|e| EncodeError::Encode(e.to_string()))?;
                let encoded = encoder
                    .encode_simple(false, f32::from(quality.min(100)))
                    .map_err(|e| EncodeError::Encode(format!("libwebp: {:?}", e)))?;
                Ok(Bytes::copy_from_slice(&encoded))
            }
            OutputFormat::Jpeg => {
                let mut buf = Vec::new();
                img.write_with_encoder(JpegEncoder::new_with_quality(
                    &mut buf,
                    quality.clamp(1, 100),
                ))
                .map_err(|e| EncodeError::Encode(e.to_string()))?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl ImageEncoder for ImageCodec {
    /// Decode with format sniffing and default limits, encode the buffer as-is
    fn encode(&self, input: &[u8], quality: u8) -> Result<Bytes, EncodeError> {
        let img = image::load_from_memory(input).map_err(|e| EncodeError::Decode(e.to_string()))?;
        self.write(&img, quality)
    }

    /// Decode without limits and normalise to 8-bit pixels the target encoder accepts
    fn encode_fallback(&self, input: &[u8], quality: u8) -> Result<Bytes, EncodeError> {
        let mut reader = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| EncodeError::Decode(e.to_string()))?;
        reader.no_limits();
        let img = reader
            .decode()
            .map_err(|e| EncodeError::Decode(e.to_string()))?;

        let normalised = match self.format {
            OutputFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8()),
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        };
        self.write(&normalised, quality)
    }
}
