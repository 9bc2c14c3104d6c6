//! Image codec boundary.
//!
//! The interceptor only needs three things from a codec: what format some bytes
//! are, whether that format can be processed, and a way to apply one
//! [`Distortion`]. Everything pixel-level lives behind this trait.

use image::ImageFormat;
use thiserror::Error;

use super::operations::Distortion;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to decode {format:?} image: {source}")]
    Decode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported image format {0:?}")]
    Unsupported(ImageFormat),
    #[error("failed to encode {format:?} image: {source}")]
    Encode {
        format: ImageFormat,
        #[source]
        source: image::ImageError,
    },
}

/// Decode, distort and re-encode images held in memory.
pub trait ImageCodec: Send + Sync {
    /// Detect the encoding from the byte content. `None` when unrecognised.
    fn sniff(&self, bytes: &[u8]) -> Option<ImageFormat>;

    /// Whether [`apply`](Self::apply) can round-trip this format.
    fn is_supported(&self, format: ImageFormat) -> bool;

    /// Apply one distortion and re-encode in `format`.
    fn apply(
        &self,
        distortion: Distortion,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<Vec<u8>, CodecError>;
}

/// Resolve a format name as used in configuration ("jpeg", "png", ...).
pub fn format_from_name(name: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(name.trim().to_ascii_lowercase())
}
