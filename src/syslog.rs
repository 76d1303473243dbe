// EggCam — System Log
//
// User-visible events (count changes, failures, reset cause) are queued with
// `put` from any task and drained by the log task into the `log` facade and a
// short history that is kept in NVS across deep sleep.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use heapless::Deque;

use crate::clock::{format_timestamp, Clock};
use crate::config::LOG_HISTORY_LEN;
use crate::params::NvBackend;
use crate::sync::lock;

const NV_KEY: &str = "syslog";
const MAX_TEXT_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Error = 1,
    Warning = 2,
    Info = 3,
}

impl Verbosity {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: i64,
    pub verbosity: Verbosity,
    pub text: String,
}

pub struct SystemLog {
    clock: Arc<dyn Clock>,
    pending: Mutex<VecDeque<LogEntry>>,
    history: Mutex<Deque<LogEntry, LOG_HISTORY_LEN>>,
}

impl SystemLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(VecDeque::new()),
            history: Mutex::new(Deque::new()),
        }
    }

    pub fn put(&self, verbosity: Verbosity, text: impl Into<String>) {
        let mut text = text.into();
        if text.len() > MAX_TEXT_LEN {
            let mut end = MAX_TEXT_LEN;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        lock(&self.pending).push_back(LogEntry {
            timestamp: self.clock.now(),
            verbosity,
            text,
        });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.put(Verbosity::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.put(Verbosity::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.put(Verbosity::Error, text);
    }

    /// Emit queued entries and move them into the history. Returns how many
    /// entries were drained.
    pub fn drain(&self) -> usize {
        let entries: Vec<LogEntry> = lock(&self.pending).drain(..).collect();
        if entries.is_empty() {
            return 0;
        }
        let mut history = lock(&self.history);
        for entry in &entries {
            let stamp = format_timestamp(entry.timestamp);
            match entry.verbosity {
                Verbosity::Error => log::error!("[{}] {}", stamp, entry.text),
                Verbosity::Warning => log::warn!("[{}] {}", stamp, entry.text),
                Verbosity::Info => log::info!("[{}] {}", stamp, entry.text),
            }
            if history.is_full() {
                history.pop_front();
            }
            // Cannot fail: a slot was just freed.
            let _ = history.push_back(entry.clone());
        }
        entries.len()
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<LogEntry> {
        lock(&self.history).iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    //
    // Record: timestamp i64 | verbosity u8 | len u16 | text[len], all LE.
    // -----------------------------------------------------------------------

    /// Drain whatever is still queued, then store the history.
    pub fn persist(&self, nv: &mut dyn NvBackend) -> anyhow::Result<()> {
        self.drain();
        let mut blob = Vec::new();
        for entry in lock(&self.history).iter() {
            blob.extend_from_slice(&entry.timestamp.to_le_bytes());
            blob.push(entry.verbosity as u8);
            blob.extend_from_slice(&(entry.text.len() as u16).to_le_bytes());
            blob.extend_from_slice(entry.text.as_bytes());
        }
        nv.store(NV_KEY, &blob)
    }

    pub fn load(&self, nv: &mut dyn NvBackend) {
        let mut buf = vec![0u8; LOG_HISTORY_LEN * (11 + MAX_TEXT_LEN)];
        let len = match nv.load(NV_KEY, &mut buf) {
            Ok(Some(len)) => len,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Cannot read log history: {}", e);
                return;
            }
        };

        let mut history = lock(&self.history);
        let mut rest = &buf[..len];
        while let Some((entry, tail)) = decode_entry(rest) {
            if history.is_full() {
                history.pop_front();
            }
            let _ = history.push_back(entry);
            rest = tail;
        }
        if !rest.is_empty() {
            log::warn!("Log history truncated ({} stray bytes)", rest.len());
        }
    }
}

fn decode_entry(data: &[u8]) -> Option<(LogEntry, &[u8])> {
    let timestamp = i64::from_le_bytes(data.get(0..8)?.try_into().ok()?);
    let verbosity = Verbosity::from_raw(*data.get(8)?)?;
    let len = u16::from_le_bytes(data.get(9..11)?.try_into().ok()?) as usize;
    let text = std::str::from_utf8(data.get(11..11 + len)?).ok()?.to_owned();
    Some((LogEntry { timestamp, verbosity, text }, &data[11 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, MemoryNv};

    fn log_at(t: i64) -> SystemLog {
        SystemLog::new(Arc::new(FakeClock::new(t)))
    }

    #[test]
    fn drain_moves_entries_to_history() {
        let log = log_at(1_000);
        log.info("first");
        log.error("second");
        assert_eq!(log.pending(), 2);
        assert_eq!(log.drain(), 2);
        assert_eq!(log.pending(), 0);

        let history = log.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "first");
        assert_eq!(history[1].verbosity, Verbosity::Error);
        assert_eq!(history[1].timestamp, 1_000);
    }

    #[test]
    fn history_keeps_newest_entries() {
        let log = log_at(0);
        for i in 0..LOG_HISTORY_LEN + 4 {
            log.info(format!("entry {i}"));
        }
        log.drain();
        let history = log.history();
        assert_eq!(history.len(), LOG_HISTORY_LEN);
        assert_eq!(history[0].text, "entry 4");
    }

    #[test]
    fn history_survives_persist_and_load() {
        let mut nv = MemoryNv::default();
        let log = log_at(42);
        log.warn("Pocet vajicek se zmenil z 3 na 4");
        log.persist(&mut nv).unwrap();

        let rebooted = log_at(100);
        rebooted.load(&mut nv);
        let history = rebooted.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, 42);
        assert_eq!(history[0].verbosity, Verbosity::Warning);
        assert_eq!(history[0].text, "Pocet vajicek se zmenil z 3 na 4");
    }

    #[test]
    fn long_text_is_truncated() {
        let log = log_at(0);
        log.info("x".repeat(MAX_TEXT_LEN * 2));
        log.drain();
        assert_eq!(log.history()[0].text.len(), MAX_TEXT_LEN);
    }
}
