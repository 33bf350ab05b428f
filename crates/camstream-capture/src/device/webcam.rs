//! Webcam access through `nokhwa`.

use bytes::Bytes;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as DeviceResolution,
};
use nokhwa::{Camera, NokhwaError};
use tracing::{debug, info, instrument, warn};

use super::{CameraDriver, DeviceRequest, FrameGrabber};
use crate::error::CaptureError;
use crate::CaptureResult;

/// Frame rate asked of the device. The scheduler paces sends separately.
const DEVICE_FPS: u32 = 30;

/// Driver for local cameras.
#[derive(Debug, Clone, Default)]
pub struct NokhwaDriver {
    index: u32,
}

impl NokhwaDriver {
    /// Use the camera at `index` in the system's device list.
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CameraDriver for NokhwaDriver {
    #[instrument(name = "webcam_open", skip(self), fields(index = self.index))]
    fn open(&self, request: &DeviceRequest) -> CaptureResult<Box<dyn FrameGrabber>> {
        let devices = nokhwa::query(ApiBackend::Auto).map_err(map_open_error)?;
        if devices.is_empty() {
            return Err(CaptureError::NoDevice);
        }

        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                DeviceResolution::new(request.ideal_width, request.ideal_height),
                FrameFormat::MJPEG,
                DEVICE_FPS,
            ),
        ));

        let mut camera =
            Camera::new(CameraIndex::Index(self.index), format).map_err(map_open_error)?;
        camera.open_stream().map_err(map_open_error)?;

        let resolution = camera.resolution();
        info!(
            width = resolution.width(),
            height = resolution.height(),
            "Camera opened"
        );

        Ok(Box::new(NokhwaGrabber {
            width: resolution.width(),
            height: resolution.height(),
            camera,
        }))
    }

    fn name(&self) -> &'static str {
        "nokhwa"
    }
}

struct NokhwaGrabber {
    camera: Camera,
    width: u32,
    height: u32,
}

impl FrameGrabber for NokhwaGrabber {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> CaptureResult<Bytes> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::FrameConversion(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::FrameConversion(e.to_string()))?;

        self.width = image.width();
        self.height = image.height();

        Ok(Bytes::from(image.into_raw()))
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("Failed to stop camera stream: {}", e);
        }
        debug!("Camera closed");
    }
}

fn map_open_error(err: NokhwaError) -> CaptureError {
    let message = err.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}
