//! Captured frame types.

use bytes::Bytes;
use std::time::Instant;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Offset from session start in microseconds.
    pub offset_us: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let offset_us = capture_time.duration_since(start_time).as_micros() as u64;

        Self {
            capture_time,
            offset_us,
        }
    }

    /// Offset from session start in milliseconds.
    pub fn offset_ms(&self) -> u64 {
        self.offset_us / 1_000
    }
}

/// One raster snapshot of the camera feed.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Packed RGB8 pixel data, row-major.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number within a session.
    pub sequence: u64,
}

impl FrameSample {
    /// Create a new frame sample.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Expected RGB8 buffer size for given dimensions.
    pub fn rgb_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Validate that the frame data matches its dimensions.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::rgb_buffer_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_buffer_size() {
        assert_eq!(FrameSample::rgb_buffer_size(640, 480), 921_600);
        assert_eq!(FrameSample::rgb_buffer_size(0, 480), 0);
    }

    #[test]
    fn test_validity_checks_length() {
        let ts = CaptureTimestamp::now(Instant::now());
        let good = FrameSample::new(Bytes::from(vec![0u8; 12]), 2, 2, ts, 0);
        let bad = FrameSample::new(Bytes::from(vec![0u8; 11]), 2, 2, ts, 1);
        assert!(good.is_valid());
        assert!(!bad.is_valid());
    }
}
