// EggCam — Flash LED Driver
//
// Simple GPIO-driven white LED.

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

use crate::flash::FlashLed;

pub struct GpioFlash {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl GpioFlash {
    /// Claim `gpio` as a push-pull output, LED off.
    pub fn new(gpio: i32) -> anyhow::Result<Self> {
        // SAFETY: the flash line is not handed to any other driver.
        let pin = unsafe { AnyOutputPin::new(gpio) };
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl FlashLed for GpioFlash {
    fn set(&mut self, on: bool) {
        let result = if on { self.pin.set_high() } else { self.pin.set_low() };
        if let Err(e) = result {
            log::warn!("Flash GPIO write failed: {}", e);
        }
    }
}
