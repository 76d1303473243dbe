// EggCam — Boot / Reset Classifier
//
// Folds the ESP-IDF `esp_reset_reason_t` codes into the handful of causes
// the gateway cares about.

use crate::params::{ParamId, ParamStore};
use crate::syslog::SystemLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Unknown = 0,
    Software = 1,
    Watchdog = 2,
    Brownout = 3,
    PowerOn = 4,
    External = 5,
    DeepSleep = 6,
}

impl ResetReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Software => "software",
            Self::Watchdog => "watchdog",
            Self::Brownout => "brownout",
            Self::PowerOn => "power-on",
            Self::External => "external pin",
            Self::DeepSleep => "deep-sleep timer",
        }
    }
}

// esp_reset_reason_t
const ESP_RST_POWERON: u32 = 1;
const ESP_RST_EXT: u32 = 2;
const ESP_RST_SW: u32 = 3;
const ESP_RST_PANIC: u32 = 4;
const ESP_RST_INT_WDT: u32 = 5;
const ESP_RST_TASK_WDT: u32 = 6;
const ESP_RST_WDT: u32 = 7;
const ESP_RST_DEEPSLEEP: u32 = 8;
const ESP_RST_BROWNOUT: u32 = 9;
const ESP_RST_USB: u32 = 11;
const ESP_RST_JTAG: u32 = 12;
const ESP_RST_PWR_GLITCH: u32 = 14;
const ESP_RST_CPU_LOCKUP: u32 = 15;

pub fn classify(code: u32) -> ResetReason {
    match code {
        ESP_RST_POWERON => ResetReason::PowerOn,
        ESP_RST_EXT => ResetReason::External,
        ESP_RST_SW | ESP_RST_USB | ESP_RST_JTAG => ResetReason::Software,
        ESP_RST_PANIC | ESP_RST_INT_WDT | ESP_RST_TASK_WDT | ESP_RST_WDT | ESP_RST_CPU_LOCKUP => {
            ResetReason::Watchdog
        }
        ESP_RST_DEEPSLEEP => ResetReason::DeepSleep,
        ESP_RST_BROWNOUT | ESP_RST_PWR_GLITCH => ResetReason::Brownout,
        _ => ResetReason::Unknown,
    }
}

/// Store the reset cause and queue it as the first log entry of the boot.
pub fn record(params: &ParamStore, log: &SystemLog, reason: ResetReason) {
    params.set(ParamId::ResetReason, reason as i32);
    log.info(format!("Reset: {}", reason.describe()));
}
