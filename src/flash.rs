// EggCam — Illumination Controller
//
// Drives the white LED around a capture according to `PouzitBlesk`. After
// switching the LED on, the sensor gets `FLASH_SETTLE_MS` to converge its
// exposure and gain before the frame is grabbed.

use std::time::Duration;

use crate::clock::Clock;
use crate::config::FLASH_SETTLE_MS;
use crate::params::CaptureMode;

/// A single on/off light source.
pub trait FlashLed: Send {
    fn set(&mut self, on: bool);
}

pub struct Illumination {
    led: Option<Box<dyn FlashLed>>,
    lit: bool,
}

impl Illumination {
    /// `None` for boards without a flash LED.
    pub fn new(led: Option<Box<dyn FlashLed>>) -> Self {
        Self { led, lit: false }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Light the scene if `policy` asks for it. `is_day` is only consulted
    /// in auto mode. Returns whether the LED was switched on.
    pub fn prepare(
        &mut self,
        policy: CaptureMode,
        is_day: impl FnOnce() -> bool,
        clock: &dyn Clock,
    ) -> bool {
        let Some(led) = self.led.as_mut() else {
            return false;
        };
        let on = match policy {
            CaptureMode::Always => true,
            CaptureMode::Never => false,
            CaptureMode::Auto => !is_day(),
        };
        led.set(on);
        self.lit = on;
        if on {
            log::debug!("Flash on, settling {} ms", FLASH_SETTLE_MS);
            clock.delay(Duration::from_millis(FLASH_SETTLE_MS));
        }
        on
    }

    pub fn release(&mut self) {
        if let Some(led) = self.led.as_mut() {
            led.set(false);
        }
        self.lit = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, FakeFlash};

    #[test]
    fn always_lights_and_settles() {
        let flash = FakeFlash::default();
        let clock = FakeClock::new(0);
        let mut ill = Illumination::new(Some(Box::new(flash.clone())));

        assert!(ill.prepare(CaptureMode::Always, || true, &clock));
        assert!(flash.is_on());
        assert_eq!(clock.slept(), Duration::from_millis(FLASH_SETTLE_MS));

        ill.release();
        assert!(!flash.is_on());
        assert_eq!(flash.switch_ons(), 1);
    }

    #[test]
    fn never_keeps_led_dark() {
        let flash = FakeFlash::default();
        let clock = FakeClock::new(0);
        let mut ill = Illumination::new(Some(Box::new(flash.clone())));
        assert!(!ill.prepare(CaptureMode::Never, || false, &clock));
        assert!(!flash.is_on());
        assert_eq!(clock.slept(), Duration::ZERO);
    }

    #[test]
    fn auto_follows_daylight() {
        let flash = FakeFlash::default();
        let clock = FakeClock::new(0);
        let mut ill = Illumination::new(Some(Box::new(flash.clone())));
        assert!(!ill.prepare(CaptureMode::Auto, || true, &clock));
        ill.release();
        assert!(ill.prepare(CaptureMode::Auto, || false, &clock));
        assert!(ill.is_lit());
    }

    #[test]
    fn no_led_means_no_delay() {
        let clock = FakeClock::new(0);
        let mut ill = Illumination::new(None);
        assert!(!ill.prepare(CaptureMode::Always, || false, &clock));
        assert_eq!(clock.slept(), Duration::ZERO);
        ill.release();
    }
}
