// EggCam — Wall Clock
//
// Unix time in seconds plus a blocking delay. The ESP-IDF build uses
// `drivers::power::EspClock`; tests use `testing::FakeClock`.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> i64;

    /// Block the calling task.
    fn delay(&self, duration: Duration);

    /// Step the wall clock (gateway time sync).
    fn set_now(&self, _unix_time: i64) {}

    /// Apply a POSIX TZ string such as `CET-1CEST,M3.5.0,M10.5.0/3`.
    fn set_timezone(&self, _tz: &str) {}
}

/// Host clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn delay(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// `YYYY-MM-DD HH:MM:SS` (UTC), the format of the `AktualniCas` parameter.
pub fn format_timestamp(unix_time: i64) -> String {
    chrono::DateTime::from_timestamp(unix_time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_utc_timestamp() {
        // 2024-04-12 06:00:00 UTC
        assert_eq!(format_timestamp(1_712_901_600), "2024-04-12 06:00:00");
    }

    #[test]
    fn timestamp_fits_parameter() {
        assert!(format_timestamp(4_102_444_800).len() <= 20);
    }
}
