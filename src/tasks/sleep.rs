// EggCam — Sleep Task

use crate::sleep::{Power, SleepSupervisor};

/// Hands the node to `power` once every other task is idle. Never returns.
pub fn sleep_task<P: Power>(supervisor: SleepSupervisor, mut power: P) -> ! {
    log::info!("Sleep supervisor started");
    supervisor.run(&mut power)
}
