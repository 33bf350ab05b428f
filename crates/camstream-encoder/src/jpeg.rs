//! JPEG codec.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use camstream_capture::FrameSample;

use crate::error::EncoderError;
use crate::{EncoderResult, FrameCodec};

/// Map a quality factor in (0, 1] to the JPEG 1-100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    if quality.is_nan() {
        return 1;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Baseline JPEG via the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl FrameCodec for JpegCodec {
    fn encode(&self, sample: &FrameSample, quality: f32) -> EncoderResult<Bytes> {
        if sample.width == 0 || sample.height == 0 {
            return Err(EncoderError::InvalidInput(format!(
                "Empty frame {}x{}",
                sample.width, sample.height
            )));
        }

        if !sample.is_valid() {
            return Err(EncoderError::InvalidInput(format!(
                "Expected {} bytes ({}x{} RGB8), got {}",
                FrameSample::rgb_buffer_size(sample.width, sample.height),
                sample.width,
                sample.height,
                sample.data.len()
            )));
        }

        // Compressed output is typically far smaller than raw RGB.
        let mut out = Vec::with_capacity(sample.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality)).write_image(
            &sample.data,
            sample.width,
            sample.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(Bytes::from(out))
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }
}
