// EggCam — Edge Impulse Inference Interface
//
// Safe Rust API over the egg object-detection model.
//
// Architecture:
//   1. STUB mode (default): `StubDetector` reports no eggs so the rest of the
//      firmware can be developed and tested without the C++ Edge Impulse SDK
//      compiled in.
//   2. FFI mode: build with `--features edge-impulse`; build.rs compiles the
//      exported SDK plus `csrc/egg_detector.cpp` and `EdgeImpulse` calls it.
//
// The model reads its input through a `Signal` that borrows the
// MODEL_W x MODEL_H RGB888 region of the working buffer.

use crate::error::Result;

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

/// One detected object in model-input pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub label: String,
    pub value: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub dsp_ms: i32,
    pub classification_ms: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub boxes: Vec<BoundingBox>,
    pub timing: Timing,
}

/// Model input: one float per pixel.
pub struct Signal<'a> {
    pixels: &'a [u8],
    pub total_length: usize,
}

impl<'a> Signal<'a> {
    /// `pixels` is packed RGB888.
    pub fn new(pixels: &'a [u8]) -> Self {
        Self { pixels, total_length: pixels.len() / 3 }
    }

    /// Fill `out` with pixels `offset..offset + out.len()`, each packed as
    /// `0xRRGGBB`. Fails when the range runs past the image.
    ///
    /// The model was trained on esp32-camera frames. That driver's RGB888
    /// conversion stores each pixel as B, G, R and packs it as
    /// `byte[2] << 16 | byte[1] << 8 | byte[0]`, which is red in the high
    /// byte. Frames here come from the `image` decoder in R, G, B order, so
    /// packing `byte[0]` high gives the model the same value.
    pub fn get_data(&self, offset: usize, out: &mut [f32]) -> core::result::Result<(), ()> {
        if offset + out.len() > self.total_length {
            return Err(());
        }
        let src = &self.pixels[offset * 3..(offset + out.len()) * 3];
        for (dst, px) in out.iter_mut().zip(src.chunks_exact(3)) {
            *dst = ((px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32) as f32;
        }
        Ok(())
    }
}

pub trait ObjectDetector: Send {
    /// Model input `(width, height)` in pixels.
    fn input_size(&self) -> (usize, usize);

    fn detect(&mut self, signal: &Signal<'_>) -> Result<DetectionResult>;
}

/// The model linked into this build (swap between stub / real FFI).
pub fn default_detector() -> Box<dyn ObjectDetector> {
    #[cfg(not(feature = "edge-impulse"))]
    {
        use crate::config::{MODEL_H, MODEL_W};
        return Box::new(StubDetector::new(MODEL_W, MODEL_H));
    }

    #[cfg(feature = "edge-impulse")]
    {
        return Box::new(EdgeImpulse::new());
    }
}

// ---------------------------------------------------------------------------
// Stub back-end for development and host tests
// ---------------------------------------------------------------------------
pub struct StubDetector {
    width: usize,
    height: usize,
}

impl StubDetector {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl ObjectDetector for StubDetector {
    fn input_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn detect(&mut self, signal: &Signal<'_>) -> Result<DetectionResult> {
        log::debug!("STUB inference over {} pixels, no boxes", signal.total_length);
        Ok(DetectionResult::default())
    }
}

// ---------------------------------------------------------------------------
// FFI back-end over the compiled Edge Impulse library
// ---------------------------------------------------------------------------
#[cfg(feature = "edge-impulse")]
mod ffi {
    use std::ffi::{c_char, c_int, c_void};

    pub type GetDataFn =
        unsafe extern "C" fn(ctx: *mut c_void, offset: usize, length: usize, out: *mut f32) -> c_int;

    #[repr(C)]
    pub struct EggBox {
        pub label: *const c_char,
        pub value: f32,
        pub x: u32,
        pub y: u32,
        pub width: u32,
        pub height: u32,
    }

    #[repr(C)]
    #[derive(Default)]
    pub struct EggTiming {
        pub dsp_ms: i32,
        pub classification_ms: i32,
    }

    extern "C" {
        pub fn egg_input_width() -> u32;
        pub fn egg_input_height() -> u32;
        pub fn egg_run_detector(
            get_data: GetDataFn,
            ctx: *mut c_void,
            boxes: *mut EggBox,
            capacity: usize,
            count: *mut usize,
            timing: *mut EggTiming,
        ) -> c_int;
    }
}

#[cfg(feature = "edge-impulse")]
pub struct EdgeImpulse;

#[cfg(feature = "edge-impulse")]
impl EdgeImpulse {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "edge-impulse")]
impl Default for EdgeImpulse {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "edge-impulse")]
unsafe extern "C" fn signal_get_data(
    ctx: *mut std::ffi::c_void,
    offset: usize,
    length: usize,
    out: *mut f32,
) -> std::ffi::c_int {
    // SAFETY: `ctx` is the `&Signal` passed to `egg_run_detector` below and
    // outlives the call; `out` points at `length` floats owned by the SDK.
    let signal = unsafe { &*(ctx as *const Signal<'_>) };
    let out = unsafe { std::slice::from_raw_parts_mut(out, length) };
    match signal.get_data(offset, out) {
        Ok(()) => 0,
        Err(()) => -1,
    }
}

#[cfg(feature = "edge-impulse")]
impl ObjectDetector for EdgeImpulse {
    fn input_size(&self) -> (usize, usize) {
        // SAFETY: pure getters over compile-time model constants.
        unsafe { (ffi::egg_input_width() as usize, ffi::egg_input_height() as usize) }
    }

    fn detect(&mut self, signal: &Signal<'_>) -> Result<DetectionResult> {
        use std::ffi::CStr;

        use crate::config::MAX_BOXES;
        use crate::error::Error;

        let mut raw: Vec<ffi::EggBox> = Vec::with_capacity(MAX_BOXES);
        let mut count = 0usize;
        let mut timing = ffi::EggTiming::default();

        // SAFETY: `raw` has room for MAX_BOXES entries and the shim writes at
        // most `capacity` of them, reporting how many through `count`.
        let err = unsafe {
            ffi::egg_run_detector(
                signal_get_data,
                signal as *const Signal<'_> as *mut std::ffi::c_void,
                raw.as_mut_ptr(),
                MAX_BOXES,
                &mut count,
                &mut timing,
            )
        };
        if err != 0 {
            log::error!("Edge Impulse classifier error: {}", err);
            return Err(Error::Inference(err));
        }
        unsafe { raw.set_len(count.min(MAX_BOXES)) };

        let boxes = raw
            .iter()
            .map(|b| BoundingBox {
                label: if b.label.is_null() {
                    String::new()
                } else {
                    // SAFETY: labels are static strings in the model tables.
                    unsafe { CStr::from_ptr(b.label) }.to_string_lossy().into_owned()
                },
                value: b.value,
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            })
            .collect();

        Ok(DetectionResult {
            boxes,
            timing: Timing {
                dsp_ms: timing.dsp_ms,
                classification_ms: timing.classification_ms,
            },
        })
    }
}
