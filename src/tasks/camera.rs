// EggCam — Camera Task
//
// Runs the wake cycle until the sleep supervisor halts the node.

use std::sync::Arc;

use crate::capture::Camera;
use crate::sync::TaskRegistry;
use crate::wake::WakeCycle;

pub fn camera_task<C: Camera>(mut cycle: WakeCycle<C>, tasks: Arc<TaskRegistry>) {
    let _running = tasks.enter();
    log::info!("Camera task started");

    while !tasks.is_halted() {
        cycle.run_once();
    }
    cycle.halt();
    log::debug!("Camera task halted");
}
