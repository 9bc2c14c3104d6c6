//! Pure Rust codec backed by the `image` crate.
//!
//! ## Operation mapping
//!
//! | Distortion | `image` call |
//! |---|---|
//! | Sniff | `image::guess_format` |
//! | Blur | `DynamicImage::blur` (Gaussian) |
//! | Flop | `DynamicImage::fliph` |
//! | Rotate | `DynamicImage::rotate90/180/270` |
//! | Deep fry | `unsharpen` + `adjust_contrast`, then low quality JPEG |

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use super::codec::{CodecError, ImageCodec};
use super::operations::{Angle, Distortion};

/// JPEG quality for re-encoding after operations that are not meant to degrade.
const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Formats with both a decoder and an encoder compiled in.
const CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Codec built on the `image` crate's pure Rust decoders and encoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for RustCodec {
    fn sniff(&self, bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    fn is_supported(&self, format: ImageFormat) -> bool {
        CANDIDATES.contains(&format) && format.reading_enabled() && format.writing_enabled()
    }

    fn apply(
        &self,
        distortion: Distortion,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        if !self.is_supported(format) {
            return Err(CodecError::Unsupported(format));
        }

        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|source| CodecError::Decode { format, source })?;

        let (out, quality) = match distortion {
            Distortion::Blur { sigma } => (img.blur(sigma), DEFAULT_JPEG_QUALITY),
            Distortion::Flop => (img.fliph(), DEFAULT_JPEG_QUALITY),
            Distortion::Rotate(Angle::D90) => (img.rotate90(), DEFAULT_JPEG_QUALITY),
            Distortion::Rotate(Angle::D180) => (img.rotate180(), DEFAULT_JPEG_QUALITY),
            Distortion::Rotate(Angle::D270) => (img.rotate270(), DEFAULT_JPEG_QUALITY),
            Distortion::DeepFry { quality } => {
                (img.unsharpen(3.0, 1).adjust_contrast(40.0), quality)
            }
        };

        encode(&out, format, quality)
    }
}

/// Re-encode in `format`. `jpeg_quality` only matters for JPEG output.
fn encode(img: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> Result<Vec<u8>, CodecError> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, jpeg_quality))
        }
        // WebP and GIF encoders only take 8-bit RGB(A)
        ImageFormat::WebP | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut buf, format)
        }
        _ => img.write_to(&mut buf, format),
    };
    result.map_err(|source| CodecError::Encode { format, source })?;
    Ok(buf.into_inner())
}
