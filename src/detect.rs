// EggCam — Detection Path
//
// JPEG in, annotated JPEG and egg count out:
//
//   decode -> snapshot (320x240 RGB888)
//   copy   -> full
//   resize -> snapshot[..96x96x3], in place
//   infer  -> boxes in model pixels
//   filter -> value >= CONF_THRESHOLD, scaled up and drawn onto `full`
//   encode -> owned JPEG

use crate::codec::JpegCodec;
use crate::config::*;
use crate::draw::{draw_box, Rgb888Canvas};
use crate::ei::{BoundingBox, DetectionResult, ObjectDetector, Signal};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameBuffers};

/// Outcome of one successful pass.
#[derive(Debug)]
pub struct Detection {
    /// Annotated JPEG, FULL_W x FULL_H.
    pub frame: Frame,
    /// Boxes at or above the confidence threshold.
    pub count: usize,
    pub result: DetectionResult,
}

pub struct DetectionPath {
    codec: Box<dyn JpegCodec>,
    detector: Box<dyn ObjectDetector>,
    buffers: FrameBuffers,
}

impl DetectionPath {
    pub fn new(
        codec: Box<dyn JpegCodec>,
        detector: Box<dyn ObjectDetector>,
        buffers: FrameBuffers,
    ) -> Result<Self> {
        let (w, h) = detector.input_size();
        if (w, h) != (MODEL_W, MODEL_H) {
            return Err(Error::Config(format!(
                "model expects {w}x{h}, firmware is built for {MODEL_W}x{MODEL_H}"
            )));
        }
        Ok(Self { codec, detector, buffers })
    }

    pub fn detect_and_annotate(&mut self, jpeg: &[u8]) -> Result<Detection> {
        let FrameBuffers { snapshot, full } = &mut self.buffers;

        self.codec.decode_rgb888(jpeg, snapshot, FULL_W, FULL_H)?;
        full.copy_from_slice(&snapshot[..]);
        crop_and_interpolate(snapshot, FULL_W, FULL_H, MODEL_W, MODEL_H)?;

        let signal = Signal::new(&snapshot[..MODEL_FRAME_BYTES]);
        let result = self.detector.detect(&signal)?;
        log::debug!(
            "Inference: {} boxes (DSP {} ms, classification {} ms)",
            result.boxes.len(),
            result.timing.dsp_ms,
            result.timing.classification_ms
        );

        let count = count_confident(&result.boxes, CONF_THRESHOLD);
        let mut canvas = Rgb888Canvas::new(full, FULL_W, FULL_H);
        for b in result.boxes.iter().filter(|b| b.value >= CONF_THRESHOLD) {
            let (x, y, w, h) = scale_box(b);
            log::debug!("  {} ({:.2}) [x: {}, y: {}, w: {}, h: {}]", b.label, b.value, x, y, w, h);
            draw_box(&mut canvas, x, y, w, h);
        }

        let encoded =
            self.codec
                .encode_rgb888(full, FULL_W, FULL_H, ANNOTATED_JPEG_QUALITY)?;
        Ok(Detection {
            frame: Frame::jpeg(encoded, FULL_W, FULL_H),
            count,
            result,
        })
    }
}

/// Number of boxes with confidence `>= threshold`.
pub fn count_confident(boxes: &[BoundingBox], threshold: f32) -> usize {
    boxes.iter().filter(|b| b.value >= threshold).count()
}

/// Model-input box to full-frame `(x, y, width, height)`, truncating.
pub fn scale_box(b: &BoundingBox) -> (i32, i32, u32, u32) {
    let sx = |v: u32| (v as usize * FULL_W / MODEL_W) as u32;
    let sy = |v: u32| (v as usize * FULL_H / MODEL_H) as u32;
    (sx(b.x) as i32, sy(b.y) as i32, sx(b.width), sy(b.height))
}

/// Centre-crop `buf` (packed RGB888, `src_w x src_h`) to the destination
/// aspect ratio and resample it bilinearly to `dst_w x dst_h`, writing the
/// result to the start of the same buffer. Only downscaling is supported:
/// every source pixel is read before its slot is overwritten.
pub fn crop_and_interpolate(
    buf: &mut [u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Result<()> {
    if buf.len() < src_w * src_h * RGB888_BYTES || dst_w == 0 || dst_h == 0 {
        return Err(Error::Config("resize buffer too small".into()));
    }

    let (crop_w, crop_h) = if src_w * dst_h > src_h * dst_w {
        (src_h * dst_w / dst_h, src_h)
    } else {
        (src_w, src_w * dst_h / dst_w)
    };
    if crop_w < dst_w || crop_h < dst_h {
        return Err(Error::Config(format!(
            "cannot upscale {crop_w}x{crop_h} to {dst_w}x{dst_h} in place"
        )));
    }
    let x0 = (src_w - crop_w) / 2;
    let y0 = (src_h - crop_h) / 2;

    let step = |crop: usize, dst: usize| {
        if dst > 1 {
            (crop - 1) as f32 / (dst - 1) as f32
        } else {
            0.0
        }
    };
    let sx = step(crop_w, dst_w);
    let sy = step(crop_h, dst_h);

    for dy in 0..dst_h {
        let fy = dy as f32 * sy;
        let y_lo = (fy as usize).min(crop_h - 1);
        let y_hi = (y_lo + 1).min(crop_h - 1);
        let wy = fy - y_lo as f32;

        for dx in 0..dst_w {
            let fx = dx as f32 * sx;
            let x_lo = (fx as usize).min(crop_w - 1);
            let x_hi = (x_lo + 1).min(crop_w - 1);
            let wx = fx - x_lo as f32;

            let at = |x: usize, y: usize, c: usize| {
                buf[((y0 + y) * src_w + x0 + x) * RGB888_BYTES + c] as f32
            };
            let mut px = [0u8; 3];
            for (c, out) in px.iter_mut().enumerate() {
                let top = at(x_lo, y_lo, c) * (1.0 - wx) + at(x_hi, y_lo, c) * wx;
                let bottom = at(x_lo, y_hi, c) * (1.0 - wx) + at(x_hi, y_hi, c) * wx;
                *out = (top * (1.0 - wy) + bottom * wy + 0.5).min(255.0) as u8;
            }

            let i = (dy * dst_w + dx) * RGB888_BYTES;
            buf[i..i + 3].copy_from_slice(&px);
        }
    }
    Ok(())
}
