// EggCam — Sleep Supervisor
//
// Watches the task registry. As soon as no task has pending work it stops
// the other loops, waits for them to exit, saves everything that must outlive the sleep, tells the
// gateway when to expect the node again and powers down.

use std::time::Duration;

use crate::config::{HALT_TIMEOUT_MS, SLEEP_NOTICE_ATTEMPTS, SLEEP_POLL_INTERVAL_MS};
use crate::node::Node;
use crate::params::{NvBackend, ParamId, RetainedBackend};
use crate::protocol::Message;

/// Platform power control. Neither call returns.
pub trait Power: Send {
    fn restart(&mut self) -> !;
    fn deep_sleep(&mut self, seconds: u32) -> !;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepAction {
    Restart,
    DeepSleep { seconds: u32 },
}

pub struct SleepSupervisor {
    node: Node,
    nv: Box<dyn NvBackend>,
    retained: Box<dyn RetainedBackend>,
}

impl SleepSupervisor {
    pub fn new(node: Node, nv: Box<dyn NvBackend>, retained: Box<dyn RetainedBackend>) -> Self {
        Self { node, nv, retained }
    }

    /// `None` while any task is still busy.
    pub fn poll(&mut self) -> Option<SleepAction> {
        if !self.node.tasks.is_idle() {
            return None;
        }
        Some(self.prepare())
    }

    /// Halt, persist and notify. Returns what the platform should do next.
    pub fn prepare(&mut self) -> SleepAction {
        let tasks = &self.node.tasks;
        tasks.halt();
        // A gateway write applied during shutdown must land before the save.
        if !tasks.wait_stopped(Duration::from_millis(HALT_TIMEOUT_MS)) {
            log::warn!("{} task loop(s) still running, saving anyway", tasks.running());
        }

        let params = &self.node.params;
        if let Err(e) = params.persist(self.nv.as_mut(), self.retained.as_mut()) {
            log::error!("Saving parameters failed: {:#}", e);
        }
        if let Err(e) = self.node.log.persist(self.nv.as_mut()) {
            log::error!("Saving log history failed: {:#}", e);
        }

        if params.is_armed(ParamId::RestartCmd) {
            log::info!("Restart requested");
            return SleepAction::Restart;
        }

        let seconds = params.get(ParamId::PeriodaKomunikaceS).max(0) as u32;
        let notice = Message::Sleep { seconds };
        if let Err(e) = self.node.messenger.send(&self.node.master(), &notice, SLEEP_NOTICE_ATTEMPTS) {
            log::warn!("Sleep notice not delivered: {}", e);
        }
        log::info!("Deep sleep for {} s", seconds);
        SleepAction::DeepSleep { seconds }
    }

    /// Poll every SLEEP_POLL_INTERVAL_MS until the node can power down.
    pub fn run(mut self, power: &mut dyn Power) -> ! {
        loop {
            match self.poll() {
                Some(SleepAction::Restart) => power.restart(),
                Some(SleepAction::DeepSleep { seconds }) => power.deep_sleep(seconds),
                None => self.node.clock.delay(Duration::from_millis(SLEEP_POLL_INTERVAL_MS)),
            }
        }
    }
}
