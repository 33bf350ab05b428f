//! Frame sampling and compression.
//!
//! A [`FrameEncoder`] samples the newest frame from a capture feed and
//! compresses it with a [`FrameCodec`]. JPEG is the only codec shipped.

mod error;
mod jpeg;

pub use error::EncoderError;
pub use jpeg::{jpeg_quality, JpegCodec};

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use camstream_capture::{CaptureTimestamp, FrameSample, LiveFeed};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Compressed payload of one frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Compressed bytes.
    pub data: Bytes,

    /// Quality factor used, in (0, 1].
    pub quality: f32,

    /// Width of the source frame.
    pub width: u32,

    /// Height of the source frame.
    pub height: u32,

    /// When the source frame was captured.
    pub origin: CaptureTimestamp,

    /// Capture sequence number of the source frame.
    pub sequence: u64,
}

/// Trait for still-image codecs.
pub trait FrameCodec: Send + Sync {
    /// Compress packed RGB8 pixels.
    fn encode(&self, sample: &FrameSample, quality: f32) -> EncoderResult<Bytes>;

    /// Get codec name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Samples a live feed and compresses what it finds.
#[derive(Clone)]
pub struct FrameEncoder {
    feed: LiveFeed,
    codec: Arc<dyn FrameCodec>,
}

impl FrameEncoder {
    /// Create an encoder reading `feed` with a custom codec.
    pub fn new(feed: LiveFeed, codec: Arc<dyn FrameCodec>) -> Self {
        Self { feed, codec }
    }

    /// Create a JPEG encoder reading `feed`.
    pub fn jpeg(feed: LiveFeed) -> Self {
        Self::new(feed, Arc::new(JpegCodec))
    }

    /// Snapshot the feed.
    ///
    /// Returns `None` when no device is bound or nothing has been buffered
    /// yet. The sample has the feed's actual dimensions.
    pub fn capture(&self) -> Option<FrameSample> {
        self.feed.latest()
    }

    /// Compress `sample` at `quality`.
    pub fn encode(&self, sample: &FrameSample, quality: f32) -> EncoderResult<EncodedFrame> {
        let data = self.codec.encode(sample, quality)?;

        trace!(
            codec = self.codec.name(),
            sequence = sample.sequence,
            raw = sample.data.len(),
            encoded = data.len(),
            "Frame encoded"
        );

        Ok(EncodedFrame {
            data,
            quality,
            width: sample.width,
            height: sample.height,
            origin: sample.timestamp,
            sequence: sample.sequence,
        })
    }
}
