pub mod codec;

pub use codec::ImageCodec;

use crate::error::EncodeError;
use bytes::Bytes;
use tracing::{debug, warn};

/// Something that can turn an input image into the target format.
///
/// `encode` is the fast path; `encode_fallback` is slower but accepts more
/// inputs and is only tried after `encode` fails.
pub trait ImageEncoder: Send + Sync + 'static {
    fn encode(&self, input: &[u8], quality: u8) -> Result<Bytes, EncodeError>;

    fn encode_fallback(&self, input: &[u8], quality: u8) -> Result<Bytes, EncodeError>;
}

/// Output of a successful conversion
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    /// The primary path failed and the fallback produced this output
    pub used_fallback: bool,
}

impl EncodedImage {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Run the primary encode, falling back once on failure.
///
/// A fallback-recovered job is a success; when both fail the fallback's
/// error is returned.
pub fn encode_with_fallback(
    encoder: &dyn ImageEncoder,
    input: &[u8],
    quality: u8,
) -> Result<EncodedImage, EncodeError> {
    match encoder.encode(input, quality) {
        Ok(data) => Ok(EncodedImage {
            data,
            used_fallback: false,
        }),
        Err(primary) => {
            warn!("Primary encode failed: {}. Retrying with fallback.", primary);
            let data = encoder.encode_fallback(input, quality)?;
            debug!("Fallback encode recovered {} bytes", data.len());
            Ok(EncodedImage {
                data,
                used_fallback: true,
            })
        }
    }
}
