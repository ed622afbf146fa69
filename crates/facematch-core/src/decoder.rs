//! Inbound image payload decoding.
//!
//! Payloads are standard base64 text, optionally prefixed with a media-type
//! marker such as `data:image/jpeg;base64,`. Decoding happens in two phases:
//! [`ImageDecoder::verify`] walks the complete byte stream once to prove it is
//! internally consistent, then [`ImageDecoder::parse`] re-reads the original
//! bytes into a clean, usable image.

use crate::types::DecodedImage;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use image::{ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;

const MEDIA_TYPE_PREFIX: &str = "data:";
const MEDIA_TYPE_SEPARATOR: char = ',';

/// Largest accepted width or height, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error("media-type marker is not followed by a ',' separator")]
    MissingSeparator,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("image integrity check failed: {0}")]
    Integrity(#[source] image::ImageError),
    #[error("image parse failed: {0}")]
    Parse(#[source] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Strip an optional `data:<media-type>,` marker, returning the encoded data.
///
/// Payloads without a marker are returned unchanged (minus surrounding
/// whitespace).
pub fn strip_media_type(payload: &str) -> Result<&str, DecodeError> {
    let payload = payload.trim();
    if !payload.starts_with(MEDIA_TYPE_PREFIX) {
        return Ok(payload);
    }
    payload
        .split_once(MEDIA_TYPE_SEPARATOR)
        .map(|(_, data)| data.trim())
        .ok_or(DecodeError::MissingSeparator)
}

/// Turns encoded payloads into validated images.
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    max_dimension: u32,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl ImageDecoder {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode a (possibly marked) base64 payload into a usable image.
    pub fn decode(&self, payload: &str) -> Result<DecodedImage, DecodeError> {
        let encoded = strip_media_type(payload)?;
        if encoded.is_empty() {
            return Err(DecodeError::Empty);
        }

        let bytes = BASE64_STANDARD.decode(encoded)?;
        let format = self.verify(&bytes)?;
        let image = self.parse(&bytes, format)?;

        tracing::debug!(
            format = ?format,
            width = image.width(),
            height = image.height(),
            bytes = bytes.len(),
            "decoded image payload"
        );

        Ok(image)
    }

    /// Integrity check: identify the container and decode the whole stream once.
    ///
    /// The decoded pixels are discarded; only the detected format is kept.
    pub fn verify(&self, bytes: &[u8]) -> Result<ImageFormat, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format().ok_or(DecodeError::UnknownFormat)?;
        reader.limits(self.limits());
        reader.decode().map_err(DecodeError::Integrity)?;

        Ok(format)
    }

    /// Usable parse: re-read the original bytes as `format` into 8-bit RGB.
    pub fn parse(&self, bytes: &[u8], format: ImageFormat) -> Result<DecodedImage, DecodeError> {
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(self.limits());
        let image = reader.decode().map_err(DecodeError::Parse)?;
        Ok(DecodedImage::new(image.to_rgb8(), format))
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 80]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn png_payload(width: u32, height: u32) -> String {
        BASE64_STANDARD.encode(encode_png(width, height))
    }

    #[test]
    fn test_decode_plain_payload() {
        let image = ImageDecoder::default().decode(&png_payload(32, 24)).unwrap();
        assert_eq!(image.width(), 32);
        assert_eq!(image.height(), 24);
        assert_eq!(image.format(), Some(ImageFormat::Png));
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgb([200, 120, 80]));
    }

    #[test]
    fn test_decode_data_url_payload() {
        let payload = format!("data:image/png;base64,{}", png_payload(8, 8));
        let image = ImageDecoder::default().decode(&payload).unwrap();
        assert_eq!((image.width(), image.height()), (8, 8));
    }

    #[test]
    fn test_strip_is_noop_without_marker() {
        let payload = png_payload(4, 4);
        assert_eq!(strip_media_type(&payload).unwrap(), payload);
        let stripped = format!("data:image/png;base64,{payload}");
        assert_eq!(strip_media_type(&stripped).unwrap(), payload);
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = ImageDecoder::default().decode("not-base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let decoder = ImageDecoder::default();
        assert!(matches!(decoder.decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decoder.decode("   "), Err(DecodeError::Empty)));
        assert!(matches!(
            decoder.decode("data:image/png;base64,"),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_decode_rejects_marker_without_separator() {
        let err = ImageDecoder::default()
            .decode("data:image/png;base64")
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingSeparator));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let payload = BASE64_STANDARD.encode(b"definitely not an image");
        let err = ImageDecoder::default().decode(&payload).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownFormat), "got {err:?}");
    }

    #[test]
    fn test_verify_rejects_truncated_stream() {
        let bytes = encode_png(64, 64);
        let truncated = &bytes[..bytes.len() / 2];
        let err = ImageDecoder::default().verify(truncated).unwrap_err();
        assert!(matches!(err, DecodeError::Integrity(_)), "got {err:?}");
    }

    #[test]
    fn test_verify_enforces_dimension_limit() {
        let bytes = encode_png(16, 16);
        let err = ImageDecoder::new(8).verify(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Integrity(_)), "got {err:?}");
    }

    #[test]
    fn test_parse_after_verify() {
        let decoder = ImageDecoder::default();
        let bytes = encode_png(10, 5);
        let format = decoder.verify(&bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        let image = decoder.parse(&bytes, format).unwrap();
        assert_eq!((image.width(), image.height()), (10, 5));
    }
}
