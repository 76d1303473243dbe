// EggCam — Frames & Scratch Buffers

use crate::config::{FULL_FRAME_BYTES, MODEL_FRAME_BYTES};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Jpeg,
    Rgb888,
}

/// Read access shared by driver-pool frames and owned frames.
pub trait FrameData {
    fn data(&self) -> &[u8];
    fn format(&self) -> PixelFormat;
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Heap-owned frame, used for the annotated JPEG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub buf: Vec<u8>,
    pub format: PixelFormat,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    pub fn jpeg(buf: Vec<u8>, width: usize, height: usize) -> Self {
        Self { buf, format: PixelFormat::Jpeg, width, height }
    }
}

impl FrameData for Frame {
    fn data(&self) -> &[u8] {
        &self.buf
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }
}

// ---------------------------------------------------------------------------
// Scratch buffers
// ---------------------------------------------------------------------------

/// The two RGB888 regions of the detection path, allocated once at boot
/// (from PSRAM on the device) and never freed.
pub struct FrameBuffers {
    /// Decode target; after the in-place resize its prefix is the model input.
    pub snapshot: Vec<u8>,
    /// Untouched copy of the decoded frame, annotated and re-encoded.
    pub full: Vec<u8>,
}

impl FrameBuffers {
    pub fn allocate() -> Result<Self> {
        Ok(Self {
            snapshot: alloc_zeroed(FULL_FRAME_BYTES)?,
            full: alloc_zeroed(FULL_FRAME_BYTES)?,
        })
    }

    pub fn model_input(&self) -> &[u8] {
        &self.snapshot[..MODEL_FRAME_BYTES]
    }
}

fn alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::Alloc(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_have_full_frame_size() {
        let buffers = FrameBuffers::allocate().unwrap();
        assert_eq!(buffers.snapshot.len(), FULL_FRAME_BYTES);
        assert_eq!(buffers.full.len(), FULL_FRAME_BYTES);
        assert_eq!(buffers.model_input().len(), MODEL_FRAME_BYTES);
    }

    #[test]
    fn owned_frame_reports_its_shape() {
        let frame = Frame::jpeg(vec![0xff, 0xd8, 0xff, 0xd9], 320, 240);
        assert_eq!(frame.format(), PixelFormat::Jpeg);
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
    }
}
