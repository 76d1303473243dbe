// EggCam — Capture Path

use crate::error::{Error, Result};
use crate::frame::{FrameData, PixelFormat};

/// JPEG frame grabber with a reusable frame pool.
pub trait Camera: Send {
    type Frame: FrameData + Send;

    /// Take one frame from the sensor.
    fn capture(&mut self) -> Result<Self::Frame>;

    /// Give a frame back to the pool. Called exactly once per captured frame.
    fn release(&mut self, frame: Self::Frame);
}

/// A sensor that failed to initialise: every wake logs a capture failure and
/// the node still reports and sleeps.
impl<C: Camera> Camera for Option<C> {
    type Frame = C::Frame;

    fn capture(&mut self) -> Result<C::Frame> {
        match self {
            Some(camera) => camera.capture(),
            None => Err(Error::Capture("camera not initialised".into())),
        }
    }

    fn release(&mut self, frame: C::Frame) {
        if let Some(camera) = self {
            camera.release(frame);
        }
    }
}

/// Grab one JPEG frame. Frames in any other format, or empty ones, are
/// returned to the pool and reported as a capture failure.
pub fn capture<C: Camera>(camera: &mut C) -> Result<C::Frame> {
    let frame = camera.capture()?;
    if frame.format() != PixelFormat::Jpeg || frame.is_empty() {
        let reason = format!("unusable frame ({:?}, {} bytes)", frame.format(), frame.len());
        camera.release(frame);
        return Err(Error::Capture(reason));
    }
    log::debug!("Captured {}x{} JPEG, {} bytes", frame.width(), frame.height(), frame.len());
    Ok(frame)
}
