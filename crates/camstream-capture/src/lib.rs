//! Camera capture for camstream.
//!
//! A [`CaptureSession`] owns one camera for as long as it is active. A pump
//! thread keeps the newest frame in a [`LiveFeed`] that encoders sample
//! from, and offers every frame on a preview channel for the operator.

mod device;
mod error;
mod feed;
mod frame;
mod session;

#[cfg(feature = "camera")]
pub use device::webcam::NokhwaDriver;
pub use device::test_pattern::TestPatternDriver;
pub use device::{CameraDriver, DeviceRequest, FrameGrabber};
pub use error::CaptureError;
pub use feed::LiveFeed;
pub use frame::{CaptureTimestamp, FrameSample};
pub use session::CaptureSession;

use camstream_ipc::Resolution;

/// Channel capacity for preview frames.
pub const PREVIEW_CHANNEL_CAPACITY: usize = 3;

/// How long `start` waits for the device to open.
pub const DEVICE_OPEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for capture sources.
pub trait CaptureSource: Send {
    /// Acquire the device, asking for `resolution` as the ideal size.
    fn start(&mut self, resolution: Resolution) -> CaptureResult<()>;

    /// Release the device. Calling this when inactive is a no-op.
    fn stop(&mut self) -> CaptureResult<()>;

    /// Check if capture is active.
    fn is_active(&self) -> bool;

    /// Get the actual feed dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Handle to the live feed.
    fn feed(&self) -> LiveFeed;
}
