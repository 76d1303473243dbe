// EggCam — Parameter / Register Store
//
// Every configurable or observable value of the node is a typed cell with a
// stable register address, an access mode, a visibility level and one of three
// storage tiers:
//
//   Volatile     RAM only, reset on every boot (including deep-sleep wakes).
//   Retained     RTC slow memory, survives deep sleep but not power loss.
//   NonVolatile  NVS flash, survives everything.
//
// Numeric cells are atomics so any task can read them without locking; each
// parameter has a single conceptual writer.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use crate::config::*;
use crate::error::{Error, Result};
use crate::sync::lock;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Volatile,
    Retained,
    NonVolatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    R,
    RW,
}

/// Visibility bits (who may read/write the parameter).
pub mod level {
    pub const PUBLIC: u8 = 0x01;
    pub const INSTALLER: u8 = 0x02;
    /// Shared with the gateway over ESP-NOW.
    pub const ESPNOW: u8 = 0x04;
}

/// Semantic role hints for the gateway UI.
pub mod flags {
    pub const NONE: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const COMM_PERIOD: u8 = 0x02;
    pub const CHART: u8 = 0x04;
    pub const FW_VERSION: u8 = 0x08;
    pub const COMMAND: u8 = 0x10;
    pub const STATE: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    U16,
    S16,
    U32,
    S32,
    Mac,
    Str { max_len: usize },
}

impl ParamType {
    /// Number of 16-bit registers the value occupies.
    pub fn registers(&self) -> u16 {
        match self {
            ParamType::U16 | ParamType::S16 => 1,
            ParamType::U32 | ParamType::S32 => 2,
            ParamType::Mac => 3,
            ParamType::Str { max_len } => max_len.div_ceil(2) as u16,
        }
    }
}

// ---------------------------------------------------------------------------
// Value enums
// ---------------------------------------------------------------------------
/// `KonfiguraceSnimani` and `PouzitBlesk` (automaticky / vzdy / nikdy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Auto = 0,
    Always = 1,
    Never = 2,
}

impl CaptureMode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Always,
            2 => Self::Never,
            _ => Self::Auto,
        }
    }
}

/// `PoriditSnimek`, `RestartCmd` (vypnuto / povoleno).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    Off = 0,
    Armed = 1,
}

/// `StavZarizeni`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Normal = 0,
    Pairing = 1,
    Selected = 2,
    Paired = 3,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    StavZarizeni,
    PoriditSnimek,
    PocetVajec,
    KonfiguraceSnimani,
    PouzitBlesk,
    PosunVychodu,
    PosunZapadu,
    PeriodaKomunikaceS,
    MasterMacAdresa,
    WiFiKanal,
    PopisCasu,
    AktualniCas,
    CasVychodu,
    CasZapadu,
    VerzeFw,
    RestartCmd,
    CompDate,
    ResetReason,
}

pub const PARAM_COUNT: usize = 18;

#[derive(Debug)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: &'static str,
    pub address: u16,
    pub ty: ParamType,
    pub default: i32,
    pub min: i32,
    pub max: i32,
    pub access: Access,
    pub level: u8,
    pub flags: u8,
    pub storage: StorageClass,
}

impl ParamDef {
    /// Register addresses covered by this parameter.
    pub fn span(&self) -> Range<u16> {
        self.address..self.address + self.ty.registers()
    }

    /// `min == max == 0` marks an unbounded parameter.
    pub fn in_range(&self, value: i32) -> bool {
        (self.min == 0 && self.max == 0) || (self.min..=self.max).contains(&value)
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self.ty, ParamType::Mac | ParamType::Str { .. })
    }

    /// NVS key (max 15 chars).
    pub fn nv_key(&self) -> String {
        format!("r{}", self.address)
    }
}

#[allow(clippy::too_many_arguments)]
const fn def(
    id: ParamId,
    name: &'static str,
    address: u16,
    ty: ParamType,
    default: i32,
    min: i32,
    max: i32,
    access: Access,
    level: u8,
    flags: u8,
    storage: StorageClass,
) -> ParamDef {
    ParamDef { id, name, address, ty, default, min, max, access, level, flags, storage }
}

use self::level::{ESPNOW, INSTALLER, PUBLIC};
use Access::{R, RW};
use ParamType::{Mac, Str, S16, S32, U16};
use StorageClass::{NonVolatile as NV, Retained as RTC, Volatile as RAM};

/// Indexed by `ParamId`.
pub static TABLE: [ParamDef; PARAM_COUNT] = [
    // Camera state
    def(ParamId::StavZarizeni, "StavZarizeni", 1, U16, DeviceState::Pairing as i32, DeviceState::Normal as i32, DeviceState::Paired as i32, R, PUBLIC, flags::NONE, RAM),
    def(ParamId::PoriditSnimek, "PoriditSnimek", 2, U16, Switch::Off as i32, 0, 1, RW, PUBLIC | ESPNOW, flags::BOOL, RAM),
    def(ParamId::PocetVajec, "PocetVajec", 10, U16, 0, 5, 300, R, PUBLIC | ESPNOW, flags::CHART, RTC),
    // Configuration
    def(ParamId::KonfiguraceSnimani, "KonfiguraceSnimani", 3, U16, CaptureMode::Auto as i32, 0, 2, RW, PUBLIC | ESPNOW, flags::STATE, NV),
    def(ParamId::PouzitBlesk, "PouzitBlesk", 4, U16, CaptureMode::Auto as i32, 0, 2, RW, PUBLIC | ESPNOW, flags::STATE, NV),
    def(ParamId::PosunVychodu, "PosunVychodu", 5, S16, 0, -180, 180, RW, PUBLIC | ESPNOW, flags::NONE, NV),
    def(ParamId::PosunZapadu, "PosunZapadu", 6, S16, 0, -180, 180, RW, PUBLIC | ESPNOW, flags::NONE, NV),
    // ESP-NOW link
    def(ParamId::PeriodaKomunikaceS, "PeriodaKomunikace_S", 7, U16, 10, 2, 3600, RW, PUBLIC | ESPNOW, flags::COMM_PERIOD, NV),
    def(ParamId::MasterMacAdresa, "MasterMacAdresa", 200, Mac, 0xff, 0, 0, RW, INSTALLER, flags::NONE, NV),
    def(ParamId::WiFiKanal, "WiFiKanal", 203, U16, 1, 1, 13, R, PUBLIC, flags::NONE, RTC),
    // Date & time
    def(ParamId::PopisCasu, "PopisCasu", 300, Str { max_len: 46 }, 0, 0, 46, RW, PUBLIC, flags::NONE, NV),
    def(ParamId::AktualniCas, "AktualniCas", 323, Str { max_len: 20 }, 0, 0, 20, R, PUBLIC, flags::NONE, RAM),
    def(ParamId::CasVychodu, "CasVychodu", 333, S32, 0, 0, 0, R, PUBLIC, flags::NONE, RTC),
    def(ParamId::CasZapadu, "CasZapadu", 335, S32, 0, 0, 0, R, PUBLIC, flags::NONE, RTC),
    // System info
    def(ParamId::VerzeFw, "VerzeFW", 8, U16, MAIN_REVISION, MAIN_REVISION, u16::MAX as i32, R, PUBLIC | ESPNOW, flags::FW_VERSION, RAM),
    def(ParamId::RestartCmd, "RestartCmd", 9, U16, Switch::Off as i32, 0, 1, RW, INSTALLER | ESPNOW, flags::BOOL, RAM),
    def(ParamId::CompDate, "CompDate", 1001, Str { max_len: 30 }, 0, 0, 30, R, PUBLIC, flags::NONE, RAM),
    def(ParamId::ResetReason, "ResetReason", 1016, U16, 4, 0, 6, R, PUBLIC, flags::NONE, RAM),
];

// ---------------------------------------------------------------------------
// Persistence back-ends
// ---------------------------------------------------------------------------
/// Flash key/value storage (NVS on the device).
pub trait NvBackend: Send {
    /// Copy the blob stored under `key` into `buf`; `None` if absent.
    fn load(&mut self, key: &str, buf: &mut [u8]) -> anyhow::Result<Option<usize>>;
    fn store(&mut self, key: &str, data: &[u8]) -> anyhow::Result<()>;
}

/// Memory that survives deep sleep (RTC slow memory on the device).
pub trait RetainedBackend: Send {
    fn read(&self) -> RetainedImage;
    fn write(&mut self, image: &RetainedImage);
}

const RETAINED_MAGIC: u32 = 0x4567_4743;

/// Snapshot of the retained tier, indexed by `ParamId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RetainedImage {
    pub magic: u32,
    pub values: [i32; PARAM_COUNT],
    pub crc: u32,
}

impl RetainedImage {
    /// Contents of RTC memory after power-on.
    pub const EMPTY: Self = Self { magic: 0, values: [0; PARAM_COUNT], crc: 0 };

    pub fn seal(values: [i32; PARAM_COUNT]) -> Self {
        let mut image = Self { magic: RETAINED_MAGIC, values, crc: 0 };
        image.crc = image.checksum();
        image
    }

    pub fn is_valid(&self) -> bool {
        self.magic == RETAINED_MAGIC && self.crc == self.checksum()
    }

    fn checksum(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&self.magic.to_le_bytes());
        for v in &self.values {
            crc.update(&v.to_le_bytes());
        }
        crc.finish()
    }
}

/// CRC-32/ISO-HDLC, bitwise.
struct Crc32(u32);

impl Crc32 {
    fn new() -> Self {
        Self(0xffff_ffff)
    }

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.0 ^= byte as u32;
            for _ in 0..8 {
                let mask = (self.0 & 1).wrapping_neg();
                self.0 = (self.0 >> 1) ^ (0xedb8_8320 & mask);
            }
        }
    }

    fn finish(&self) -> u32 {
        !self.0
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Text(String),
    Mac([u8; 6]),
}

enum Cell {
    Int(AtomicI32),
    Text(Mutex<String>),
    Mac(Mutex<[u8; 6]>),
}

pub struct ParamStore {
    cells: Vec<Cell>,
    dirty: Vec<AtomicBool>,
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamStore {
    /// All cells at their factory defaults.
    pub fn new() -> Self {
        let cells = TABLE
            .iter()
            .map(|d| match d.ty {
                ParamType::Mac => Cell::Mac(Mutex::new([d.default as u8; 6])),
                ParamType::Str { .. } => Cell::Text(Mutex::new(String::new())),
                _ => Cell::Int(AtomicI32::new(d.default)),
            })
            .collect();
        let dirty = TABLE.iter().map(|_| AtomicBool::new(false)).collect();
        Self { cells, dirty }
    }

    pub fn def(id: ParamId) -> &'static ParamDef {
        &TABLE[id as usize]
    }

    /// Resolve any register inside a parameter's span.
    pub fn by_address(address: u16) -> Option<&'static ParamDef> {
        TABLE.iter().find(|d| d.span().contains(&address))
    }

    pub fn get(&self, id: ParamId) -> i32 {
        match &self.cells[id as usize] {
            Cell::Int(v) => v.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn set(&self, id: ParamId, value: i32) {
        if let Cell::Int(cell) = &self.cells[id as usize] {
            if cell.swap(value, Ordering::Relaxed) != value {
                self.mark_dirty(id);
            }
        } else {
            log::warn!("{} is not numeric", Self::def(id).name);
        }
    }

    pub fn text(&self, id: ParamId) -> String {
        match &self.cells[id as usize] {
            Cell::Text(s) => lock(s).clone(),
            _ => String::new(),
        }
    }

    /// Stores `value`, truncated to the parameter's maximum length.
    pub fn set_text(&self, id: ParamId, value: &str) {
        let def = Self::def(id);
        let Cell::Text(cell) = &self.cells[id as usize] else {
            log::warn!("{} is not a string", def.name);
            return;
        };
        let max_len = match def.ty {
            ParamType::Str { max_len } => max_len,
            _ => 0,
        };
        let mut end = value.len().min(max_len);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let mut current = lock(cell);
        if *current != value[..end] {
            *current = value[..end].to_owned();
            self.mark_dirty(id);
        }
    }

    pub fn mac(&self, id: ParamId) -> [u8; 6] {
        match &self.cells[id as usize] {
            Cell::Mac(m) => *lock(m),
            _ => [0; 6],
        }
    }

    pub fn set_mac(&self, id: ParamId, mac: [u8; 6]) {
        if let Cell::Mac(cell) = &self.cells[id as usize] {
            let mut current = lock(cell);
            if *current != mac {
                *current = mac;
                self.mark_dirty(id);
            }
        }
    }

    pub fn value(&self, id: ParamId) -> Value {
        match &self.cells[id as usize] {
            Cell::Int(v) => Value::Int(v.load(Ordering::Relaxed)),
            Cell::Text(s) => Value::Text(lock(s).clone()),
            Cell::Mac(m) => Value::Mac(*lock(m)),
        }
    }

    pub fn capture_mode(&self, id: ParamId) -> CaptureMode {
        CaptureMode::from_raw(self.get(id))
    }

    pub fn is_armed(&self, id: ParamId) -> bool {
        self.get(id) == Switch::Armed as i32
    }

    /// Write requested by a remote party holding the `granted` level bits.
    /// Enforces access mode, visibility and range.
    pub fn write_external(&self, address: u16, value: i32, granted: u8) -> Result<ParamId> {
        let def = Self::by_address(address)
            .ok_or_else(|| Error::Config(format!("no parameter at register {address}")))?;
        if def.access != Access::RW {
            return Err(Error::Config(format!("{} is read-only", def.name)));
        }
        if def.level & granted == 0 {
            return Err(Error::Config(format!("{} not writable at this level", def.name)));
        }
        if !def.is_numeric() || def.address != address {
            return Err(Error::Config(format!("{} cannot take a numeric value", def.name)));
        }
        if !def.in_range(value) {
            return Err(Error::Config(format!(
                "{} = {} outside {}..={}",
                def.name, value, def.min, def.max
            )));
        }
        self.set(def.id, value);
        Ok(def.id)
    }

    /// `(address, value)` of every numeric parameter visible at `level_mask`.
    pub fn report(&self, level_mask: u8) -> Vec<(u16, i32)> {
        TABLE
            .iter()
            .filter(|d| d.level & level_mask != 0 && d.is_numeric())
            .map(|d| (d.address, self.get(d.id)))
            .collect()
    }

    fn mark_dirty(&self, id: ParamId) {
        if Self::def(id).storage == StorageClass::NonVolatile {
            self.dirty[id as usize].store(true, Ordering::Relaxed);
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Restore the non-volatile and retained tiers. Missing or corrupt
    /// entries keep their defaults.
    pub fn load(&self, nv: &mut dyn NvBackend, retained: &dyn RetainedBackend) {
        let image = retained.read();
        let image_ok = image.is_valid();
        if !image_ok {
            log::info!("Retained parameters invalid, using defaults");
        }

        let mut buf = [0u8; 64];
        for def in TABLE.iter() {
            match def.storage {
                StorageClass::Volatile => {}
                StorageClass::Retained => {
                    if image_ok {
                        self.restore(def, image.values[def.id as usize]);
                    }
                }
                StorageClass::NonVolatile => match nv.load(&def.nv_key(), &mut buf) {
                    Ok(Some(len)) => self.restore_blob(def, &buf[..len]),
                    Ok(None) => {}
                    Err(e) => log::warn!("NV read of {} failed: {}", def.name, e),
                },
            }
        }
    }

    /// Write dirty non-volatile cells and the full retained tier.
    ///
    /// The retained image is written even when an NV write fails; a cell
    /// whose write failed stays dirty for the next attempt. The first NV
    /// error is returned.
    pub fn persist(
        &self,
        nv: &mut dyn NvBackend,
        retained: &mut dyn RetainedBackend,
    ) -> anyhow::Result<()> {
        let mut values = [0i32; PARAM_COUNT];
        let mut failed = 0;
        let mut first_error: Option<anyhow::Error> = None;

        for def in TABLE.iter() {
            match def.storage {
                StorageClass::Volatile => {}
                StorageClass::Retained => values[def.id as usize] = self.get(def.id),
                StorageClass::NonVolatile => {
                    let dirty = &self.dirty[def.id as usize];
                    if !dirty.swap(false, Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(e) = nv.store(&def.nv_key(), &self.blob(def.id)) {
                        dirty.store(true, Ordering::Relaxed);
                        log::warn!("NV write of {} failed: {:#}", def.name, e);
                        failed += 1;
                        first_error.get_or_insert(e.context(format!("NV write of {}", def.name)));
                    }
                }
            }
        }
        retained.write(&RetainedImage::seal(values));

        match first_error {
            Some(e) => Err(e.context(format!("{failed} NV parameter(s) not saved"))),
            None => Ok(()),
        }
    }

    fn restore(&self, def: &ParamDef, value: i32) {
        if let Cell::Int(cell) = &self.cells[def.id as usize] {
            cell.store(value, Ordering::Relaxed);
        }
    }

    fn restore_blob(&self, def: &ParamDef, data: &[u8]) {
        match &self.cells[def.id as usize] {
            Cell::Int(cell) => match <[u8; 4]>::try_from(data) {
                Ok(bytes) => cell.store(i32::from_le_bytes(bytes), Ordering::Relaxed),
                Err(_) => log::warn!("NV blob of {} has {} bytes", def.name, data.len()),
            },
            Cell::Text(cell) => match std::str::from_utf8(data) {
                Ok(s) => *lock(cell) = s.to_owned(),
                Err(_) => log::warn!("NV blob of {} is not UTF-8", def.name),
            },
            Cell::Mac(cell) => match <[u8; 6]>::try_from(data) {
                Ok(mac) => *lock(cell) = mac,
                Err(_) => log::warn!("NV blob of {} has {} bytes", def.name, data.len()),
            },
        }
    }

    fn blob(&self, id: ParamId) -> Vec<u8> {
        match self.value(id) {
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Text(s) => s.into_bytes(),
            Value::Mac(m) => m.to_vec(),
        }
    }
}
