// EggCam — Shared Node State
//
// Handles every task needs, created once in `main` and cloned into each
// thread.

use std::sync::Arc;

use crate::clock::Clock;
use crate::link::{Link, MacAddr, Messenger};
use crate::params::{ParamId, ParamStore};
use crate::sync::{TaskRegistry, WakeSignal};
use crate::syslog::SystemLog;

#[derive(Clone)]
pub struct Node {
    pub params: Arc<ParamStore>,
    pub log: Arc<SystemLog>,
    pub clock: Arc<dyn Clock>,
    pub messenger: Arc<Messenger>,
    pub signal: Arc<WakeSignal>,
    pub tasks: Arc<TaskRegistry>,
}

impl Node {
    pub fn new(
        params: Arc<ParamStore>,
        log: Arc<SystemLog>,
        clock: Arc<dyn Clock>,
        link: Arc<dyn Link>,
    ) -> Self {
        Self {
            params,
            log,
            clock,
            messenger: Arc::new(Messenger::new(link)),
            signal: Arc::new(WakeSignal::new()),
            tasks: Arc::new(TaskRegistry::new()),
        }
    }

    /// The paired gateway (broadcast while unpaired).
    pub fn master(&self) -> MacAddr {
        self.params.mac(ParamId::MasterMacAdresa)
    }
}
