// EggCam — OV2640 Camera Driver
//
// esp32-camera component through the `esp_idf_sys::camera` bindings. A single
// frame buffer lives in PSRAM, so exactly one frame can be out at a time.

use core::ptr::NonNull;

use esp_idf_sys::{camera, esp};

use crate::capture::Camera;
use crate::config::*;
use crate::error::{Error, Result};
use crate::frame::{FrameData, PixelFormat};

/// Frame borrowed from the driver pool.
pub struct EspFrame(NonNull<camera::camera_fb_t>);

// SAFETY: the buffer is only touched by whichever task owns the `EspFrame`
// and is handed back through `EspCamera::release`.
unsafe impl Send for EspFrame {}

impl EspFrame {
    fn fb(&self) -> &camera::camera_fb_t {
        // SAFETY: non-null and valid until returned to the driver.
        unsafe { self.0.as_ref() }
    }
}

impl FrameData for EspFrame {
    fn data(&self) -> &[u8] {
        let fb = self.fb();
        if fb.buf.is_null() {
            return &[];
        }
        // SAFETY: the driver guarantees `len` valid bytes at `buf`.
        unsafe { core::slice::from_raw_parts(fb.buf, fb.len) }
    }

    fn format(&self) -> PixelFormat {
        if self.fb().format == camera::pixformat_t_PIXFORMAT_JPEG {
            PixelFormat::Jpeg
        } else {
            PixelFormat::Rgb888
        }
    }

    fn width(&self) -> usize {
        self.fb().width
    }

    fn height(&self) -> usize {
        self.fb().height
    }
}

pub struct EspCamera {
    _private: (),
}

impl EspCamera {
    /// Initialise the sensor for JPEG QVGA capture.
    pub fn new() -> anyhow::Result<Self> {
        let p = CAMERA_PINS;
        let config = camera::camera_config_t {
            pin_pwdn: p.pwdn,
            pin_reset: p.reset,
            pin_xclk: p.xclk,
            __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 { pin_sccb_sda: p.sccb_sda },
            __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 { pin_sccb_scl: p.sccb_scl },
            pin_d0: p.data[0],
            pin_d1: p.data[1],
            pin_d2: p.data[2],
            pin_d3: p.data[3],
            pin_d4: p.data[4],
            pin_d5: p.data[5],
            pin_d6: p.data[6],
            pin_d7: p.data[7],
            pin_vsync: p.vsync,
            pin_href: p.href,
            pin_pclk: p.pclk,
            xclk_freq_hz: CAMERA_XCLK_HZ,
            ledc_timer: esp_idf_sys::ledc_timer_t_LEDC_TIMER_0,
            ledc_channel: esp_idf_sys::ledc_channel_t_LEDC_CHANNEL_0,
            pixel_format: camera::pixformat_t_PIXFORMAT_JPEG,
            frame_size: camera::framesize_t_FRAMESIZE_QVGA,
            jpeg_quality: CAPTURE_JPEG_QUALITY,
            fb_count: 1,
            fb_location: camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,
            grab_mode: camera::camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
            ..Default::default()
        };

        // SAFETY: `config` outlives the call; the driver copies what it keeps.
        esp!(unsafe { camera::esp_camera_init(&config) })?;
        tune_sensor();
        log::info!("Camera initialised ({}x{} JPEG, quality {})", FULL_W, FULL_H, CAPTURE_JPEG_QUALITY);
        Ok(Self { _private: () })
    }
}

/// Auto gain/exposure/white balance, a touch brighter, image rotated 180°.
fn tune_sensor() {
    // SAFETY: the sensor handle is valid after a successful init.
    unsafe {
        let s = camera::esp_camera_sensor_get();
        if s.is_null() {
            log::warn!("Camera sensor handle unavailable, using defaults");
            return;
        }
        let sensor = &*s;
        let settings = [
            (sensor.set_gain_ctrl, 1),
            (sensor.set_exposure_ctrl, 1),
            (sensor.set_whitebal, 1),
            (sensor.set_awb_gain, 1),
            (sensor.set_brightness, 1),
            (sensor.set_hmirror, 1),
            (sensor.set_vflip, 1),
        ];
        for (setter, value) in settings {
            if let Some(set) = setter {
                set(s, value);
            }
        }
    }
}

impl Camera for EspCamera {
    type Frame = EspFrame;

    fn capture(&mut self) -> Result<EspFrame> {
        // SAFETY: driver initialised in `new`.
        let fb = unsafe { camera::esp_camera_fb_get() };
        NonNull::new(fb)
            .map(EspFrame)
            .ok_or_else(|| Error::Capture("esp_camera_fb_get returned no frame".into()))
    }

    fn release(&mut self, frame: EspFrame) {
        // SAFETY: the frame came from `esp_camera_fb_get` and is returned once.
        unsafe { camera::esp_camera_fb_return(frame.0.as_ptr()) };
    }
}

impl Drop for EspCamera {
    fn drop(&mut self) {
        // SAFETY: matching deinit for the init in `new`.
        if let Err(e) = esp!(unsafe { camera::esp_camera_deinit() }) {
            log::warn!("Camera deinit failed: {}", e);
        }
    }
}
