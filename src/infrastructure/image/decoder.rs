//! Decoding with optional power-of-two downsampling.

use image::imageops::FilterType;
use tracing::trace;

use crate::domain::ports::{CacheError, CacheResult, ImageDecoder};

/// Decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampledDecoder;

impl SampledDecoder {
    /// Creates a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Largest power of two that keeps both halved dimensions above the request.
///
/// A zero in either requested dimension means "full size".
#[must_use]
pub fn sample_size(width: u32, height: u32, requested_width: u32, requested_height: u32) -> u32 {
    if requested_width == 0 || requested_height == 0 {
        return 1;
    }

    let mut sample = 1;
    if height > requested_height || width > requested_width {
        let half_height = height / 2;
        let half_width = width / 2;
        while half_height / sample >= requested_height && half_width / sample >= requested_width {
            sample *= 2;
        }
    }
    sample
}

impl ImageDecoder for SampledDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        requested_width: u32,
        requested_height: u32,
    ) -> CacheResult<image::DynamicImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| CacheError::DecodeError(format!("Failed to decode image: {e}")))?;

        let sample = sample_size(img.width(), img.height(), requested_width, requested_height);
        if sample == 1 {
            return Ok(img);
        }

        let width = (img.width() / sample).max(1);
        let height = (img.height() / sample).max(1);
        trace!(sample, width, height, "Downsampling decoded image");
        Ok(img.resize_exact(width, height, FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test_case(100, 100, 0, 0, 1 ; "no_request")]
    #[test_case(100, 100, 100, 100, 1 ; "exact_fit")]
    #[test_case(100, 100, 50, 50, 2 ; "half")]
    #[test_case(400, 300, 100, 75, 4 ; "quarter")]
    #[test_case(400, 300, 101, 75, 2 ; "width_limits")]
    #[test_case(50, 50, 200, 200, 1 ; "smaller_than_request")]
    #[test_case(1000, 10, 10, 10, 1 ; "height_limits")]
    fn test_sample_size(width: u32, height: u32, req_w: u32, req_h: u32, expected: u32) {
        assert_eq!(sample_size(width, height, req_w, req_h), expected);
    }

    #[test]
    fn test_decode_full_size() {
        let img = SampledDecoder.decode(&png(40, 20), 0, 0).unwrap();
        assert_eq!((img.width(), img.height()), (40, 20));
    }

    #[test]
    fn test_decode_downsampled() {
        let img = SampledDecoder.decode(&png(400, 300), 100, 75).unwrap();
        assert_eq!((img.width(), img.height()), (100, 75));
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        let err = SampledDecoder.decode(b"definitely not an image", 0, 0);
        assert!(matches!(err, Err(CacheError::DecodeError(_))));
    }
}
