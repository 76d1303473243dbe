// EggCam — Task Coordination
//
// `WakeSignal` is the binary semaphore that starts a wake cycle.
// `TaskRegistry` holds one "busy" flag per task, a global halt flag and a
// count of task loops still running; the sleep supervisor powers down once
// every flag is clear and, after the halt, every loop has exited.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Lock, recovering the data if another task panicked while holding it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Wake signal
// ---------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct WakeSignal {
    given: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant one wake. Repeated gives before a take collapse into one.
    pub fn give(&self) {
        *lock(&self.given) = true;
        self.cond.notify_one();
    }

    /// Wait up to `timeout` for a grant and consume it.
    pub fn take(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut given = lock(&self.given);
        while !*given {
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = self
                .cond
                .wait_timeout(given, left)
                .unwrap_or_else(PoisonError::into_inner);
            given = guard;
            if result.timed_out() && !*given {
                return false;
            }
        }
        *given = false;
        true
    }
}

// ---------------------------------------------------------------------------
// Task registry
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TaskId {
    SystemLog = 0,
    EspNowClient = 1,
    Camera = 2,
}

const TASK_COUNT: usize = 3;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    active: [AtomicBool; TASK_COUNT],
    halted: AtomicBool,
    running: AtomicUsize,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, task: TaskId, active: bool) {
        self.active[task as usize].store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self, task: TaskId) -> bool {
        self.active[task as usize].load(Ordering::SeqCst)
    }

    /// No task has pending work.
    pub fn is_idle(&self) -> bool {
        self.active.iter().all(|a| !a.load(Ordering::SeqCst))
    }

    /// Ask every task loop to exit at its next iteration.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Count the calling task loop as running until the guard drops. Take it
    /// before the first `is_halted` check.
    pub fn enter(&self) -> RunningLoop<'_> {
        self.running.fetch_add(1, Ordering::SeqCst);
        RunningLoop(self)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// After `halt`, wait up to `timeout` for every loop to exit.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.running() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Mark the camera busy, then grant the wake signal, so the supervisor
    /// never sees an idle window between the two.
    pub fn wake_camera(&self, signal: &WakeSignal) {
        self.set_active(TaskId::Camera, true);
        signal.give();
    }
}

/// Held by a task loop for as long as it runs.
#[must_use]
pub struct RunningLoop<'a>(&'a TaskRegistry);

impl Drop for RunningLoop<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn take_times_out_without_give() {
        let signal = WakeSignal::new();
        assert!(!signal.take(Duration::from_millis(20)));
    }

    #[test]
    fn give_is_consumed_once() {
        let signal = WakeSignal::new();
        signal.give();
        signal.give();
        assert!(signal.take(Duration::from_millis(10)));
        assert!(!signal.take(Duration::from_millis(10)));
    }

    #[test]
    fn give_from_another_thread_wakes_taker() {
        let signal = Arc::new(WakeSignal::new());
        let giver = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            giver.give();
        });
        assert!(signal.take(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn registry_tracks_idle_and_halt() {
        let registry = TaskRegistry::new();
        assert!(registry.is_idle());

        let signal = WakeSignal::new();
        registry.wake_camera(&signal);
        assert!(registry.is_active(TaskId::Camera));
        assert!(!registry.is_idle());

        registry.set_active(TaskId::Camera, false);
        assert!(registry.is_idle());
        assert!(!registry.is_halted());
        registry.halt();
        assert!(registry.is_halted());
    }

    #[test]
    fn waits_for_running_loops_to_exit() {
        let registry = Arc::new(TaskRegistry::new());
        assert!(registry.wait_stopped(Duration::ZERO));

        let guard = registry.enter();
        assert_eq!(registry.running(), 1);
        assert!(!registry.wait_stopped(Duration::from_millis(5)));
        drop(guard);

        let worker = Arc::clone(&registry);
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let _running = worker.enter();
            started_tx.send(()).unwrap();
            while !worker.is_halted() {
                thread::sleep(Duration::from_millis(1));
            }
        });
        started_rx.recv().unwrap();
        registry.halt();
        assert!(registry.wait_stopped(Duration::from_secs(2)));
        handle.join().unwrap();
    }
}
