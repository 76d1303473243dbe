// EggCam — Persistent Storage Drivers
//
// NvsStore: blobs in the NVS namespace `params`, one key per parameter.
// RtcRetained: the retained-parameter image in RTC slow memory, which keeps
// its contents through deep sleep and is zeroed by a power cycle.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use crate::config::NVS_NAMESPACE;
use crate::params::{NvBackend, RetainedBackend, RetainedImage};

pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        Ok(Self { nvs: EspNvs::new(partition, NVS_NAMESPACE, true)? })
    }
}

impl NvBackend for NvsStore {
    fn load(&mut self, key: &str, buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
        Ok(self.nvs.get_raw(key, buf)?.map(<[u8]>::len))
    }

    fn store(&mut self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        self.nvs.set_raw(key, data)?;
        Ok(())
    }
}

#[link_section = ".rtc.data"]
static mut RTC_IMAGE: RetainedImage = RetainedImage::EMPTY;

/// Handle to the single RTC image; create one per boot.
pub struct RtcRetained {
    _private: (),
}

impl RtcRetained {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for RtcRetained {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedBackend for RtcRetained {
    fn read(&self) -> RetainedImage {
        // SAFETY: only read at boot and written by the sleep task after every
        // other task has halted.
        unsafe { core::ptr::addr_of!(RTC_IMAGE).read_volatile() }
    }

    fn write(&mut self, image: &RetainedImage) {
        // SAFETY: see `read`.
        unsafe { core::ptr::addr_of_mut!(RTC_IMAGE).write_volatile(*image) }
    }
}
