//! Camera device backends.

#[cfg(feature = "camera")]
pub mod webcam;
pub mod test_pattern;

use bytes::Bytes;

use camstream_ipc::Resolution;

use crate::CaptureResult;

/// Dimensions asked of the device. Treated as an ideal, not a guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Preferred width in pixels.
    pub ideal_width: u32,

    /// Preferred height in pixels.
    pub ideal_height: u32,
}

impl From<Resolution> for DeviceRequest {
    fn from(resolution: Resolution) -> Self {
        Self {
            ideal_width: resolution.width(),
            ideal_height: resolution.height(),
        }
    }
}

/// Opens camera devices.
///
/// `open` runs on the capture pump thread, so grabbers need not be `Send`.
pub trait CameraDriver: Send + Sync {
    /// Acquire a device.
    fn open(&self, request: &DeviceRequest) -> CaptureResult<Box<dyn FrameGrabber>>;

    /// Get driver name for diagnostics.
    fn name(&self) -> &'static str;
}

/// An opened camera device.
pub trait FrameGrabber {
    /// Actual output dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Block until the next frame and return it as packed RGB8.
    fn grab(&mut self) -> CaptureResult<Bytes>;

    /// Release the device.
    fn close(&mut self);
}
