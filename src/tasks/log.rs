// EggCam — System Log Task
//
// Drains the system log every LOG_DRAIN_INTERVAL_MS. The task counts as busy
// while entries are waiting, so the node never sleeps on an unflushed queue.

use std::thread;
use std::time::Duration;

use crate::config::LOG_DRAIN_INTERVAL_MS;
use crate::node::Node;
use crate::sync::TaskId;

pub fn log_task(node: Node) {
    let _running = node.tasks.enter();
    ::log::info!("Log task started");

    let interval = Duration::from_millis(LOG_DRAIN_INTERVAL_MS);
    while !node.tasks.is_halted() {
        drain_once(&node);
        thread::sleep(interval);
    }
}

/// One drain pass; returns the number of entries emitted.
pub fn drain_once(node: &Node) -> usize {
    if node.log.pending() == 0 {
        return 0;
    }
    node.tasks.set_active(TaskId::SystemLog, true);
    let drained = node.log.drain();
    node.tasks.set_active(TaskId::SystemLog, false);
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn drains_and_leaves_task_idle() {
        let (node, _, _) = testing::node(0);
        node.log.info("hello");
        assert_eq!(drain_once(&node), 1);
        assert_eq!(drain_once(&node), 0);
        assert!(!node.tasks.is_active(TaskId::SystemLog));
        assert_eq!(node.log.history().len(), 1);
    }

    #[test]
    fn exits_when_halted() {
        let (node, _, _) = testing::node(0);
        node.tasks.halt();
        log_task(node);
    }
}
