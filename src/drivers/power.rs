// EggCam — Power, Clock & Reset Cause

use std::ffi::CString;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::clock::Clock;
use crate::sleep::Power;

pub struct EspPower;

impl Power for EspPower {
    fn restart(&mut self) -> ! {
        log::info!("Restarting");
        unsafe { esp_idf_sys::esp_restart() }
    }

    /// Arm the RTC timer and enter deep sleep. Does not return.
    fn deep_sleep(&mut self, seconds: u32) -> ! {
        unsafe {
            esp_idf_sys::esp_sleep_enable_timer_wakeup(seconds as u64 * 1_000_000);
            esp_idf_sys::esp_deep_sleep_start()
        }
    }
}

/// System time, stepped from the gateway at every boot.
pub struct EspClock;

impl Clock for EspClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn delay(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn set_now(&self, unix_time: i64) {
        let tv = esp_idf_sys::timeval { tv_sec: unix_time as _, tv_usec: 0 };
        // SAFETY: plain libc call with a valid timeval and no timezone.
        let ret = unsafe { esp_idf_sys::settimeofday(&tv, core::ptr::null()) };
        if ret != 0 {
            log::warn!("settimeofday failed ({})", ret);
        }
    }

    fn set_timezone(&self, tz: &str) {
        let Ok(value) = CString::new(tz) else {
            log::warn!("Timezone string contains NUL");
            return;
        };
        // SAFETY: both strings are NUL-terminated and outlive the calls.
        unsafe {
            esp_idf_sys::setenv(c"TZ".as_ptr(), value.as_ptr(), 1);
            esp_idf_sys::tzset();
        }
    }
}

/// Raw `esp_reset_reason_t` of the current boot.
pub fn reset_code() -> u32 {
    unsafe { esp_idf_sys::esp_reset_reason() as u32 }
}
