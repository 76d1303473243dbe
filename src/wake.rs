// EggCam — Wake Cycle Controller
//
// One wake = one pass through
//
//   Idle -> Arming -> Capturing -> Detecting -> Publishing -> Idle
//
// with early exits back to Idle when the capture policy declines or the
// camera fails. Detection and transmit failures degrade (raw photo, no
// count) but never stop the cycle. At most one picture is held at a time and
// a driver frame always goes back to the camera pool before the next capture.

use std::sync::Arc;
use std::time::Duration;

use crate::capture::{self, Camera};
use crate::clock::format_timestamp;
use crate::config::WAKE_SIGNAL_TIMEOUT_MS;
use crate::count;
use crate::daylight;
use crate::detect::DetectionPath;
use crate::flash::Illumination;
use crate::frame::{Frame, FrameData};
use crate::link::format_mac;
use crate::node::Node;
use crate::params::{CaptureMode, ParamId, Switch};
use crate::sync::TaskId;
use crate::transmit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Idle,
    Arming,
    Capturing,
    Detecting,
    Publishing,
    Sleeping,
}

/// The picture travelling through the current wake.
pub enum Picture<F> {
    /// Driver frame, must go back to the camera pool.
    Raw(F),
    /// Annotated JPEG in an owned buffer.
    Annotated(Frame),
}

impl<F: FrameData> Picture<F> {
    pub fn data(&self) -> &[u8] {
        match self {
            Picture::Raw(f) => f.data(),
            Picture::Annotated(f) => f.data(),
        }
    }
}

pub struct WakeCycle<C: Camera> {
    camera: C,
    detection: Option<DetectionPath>,
    flash: Illumination,
    node: Node,
    state: WakeState,
    held: Option<Picture<C::Frame>>,
}

impl<C: Camera> WakeCycle<C> {
    /// `detection` is `None` when the scratch buffers could not be allocated;
    /// photos are then sent unannotated.
    pub fn new(camera: C, detection: Option<DetectionPath>, flash: Illumination, node: Node) -> Self {
        Self {
            camera,
            detection,
            flash,
            node,
            state: WakeState::Idle,
            held: None,
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn holds_picture(&self) -> bool {
        self.held.is_some()
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Wait for a wake signal and, if one arrives, run a full cycle.
    pub fn run_once(&mut self) -> WakeState {
        if !self.node.signal.take(Duration::from_millis(WAKE_SIGNAL_TIMEOUT_MS)) {
            return self.state;
        }

        self.state = WakeState::Arming;
        self.node.tasks.set_active(TaskId::Camera, true);
        self.cycle();
        self.state = WakeState::Idle;
        self.node.tasks.set_active(TaskId::Camera, false);
        self.state
    }

    /// Final state before the device powers down.
    pub fn halt(&mut self) {
        if let Some(picture) = self.held.take() {
            self.release(picture);
        }
        self.state = WakeState::Sleeping;
    }

    fn cycle(&mut self) {
        // ---- Arming ----------------------------------------------------------
        let params = Arc::clone(&self.node.params);
        let clock = Arc::clone(&self.node.clock);
        let now = clock.now();
        params.set_text(ParamId::AktualniCas, &format_timestamp(now));

        if self.held.is_some() {
            log::warn!("Previous picture still held, skipping capture");
            return;
        }

        let mut day = None;
        let mut is_day = || *day.get_or_insert_with(|| daylight::is_day(&params, now));

        let armed = params.is_armed(ParamId::PoriditSnimek);
        let policy = params.capture_mode(ParamId::KonfiguraceSnimani);
        let admitted = match policy {
            CaptureMode::Always => true,
            CaptureMode::Auto => armed || is_day(),
            CaptureMode::Never => armed,
        };
        if !admitted {
            log::info!("No capture this wake (policy {:?})", policy);
            return;
        }
        if armed {
            params.set(ParamId::PoriditSnimek, Switch::Off as i32);
        }

        // ---- Capturing -------------------------------------------------------
        self.state = WakeState::Capturing;
        let flash_policy = params.capture_mode(ParamId::PouzitBlesk);
        self.flash.prepare(flash_policy, &mut is_day, clock.as_ref());
        let captured = capture::capture(&mut self.camera);
        self.flash.release();

        let raw = match captured {
            Ok(frame) => frame,
            Err(e) => {
                self.node.log.error(format!("Capture failed: {e}"));
                return;
            }
        };

        // ---- Detecting -------------------------------------------------------
        self.state = WakeState::Detecting;
        let mut detected = None;
        let picture = match self.detection.as_mut() {
            Some(path) => match path.detect_and_annotate(raw.data()) {
                Ok(detection) => {
                    self.camera.release(raw);
                    detected = Some(detection.count);
                    Picture::Annotated(detection.frame)
                }
                Err(e) => {
                    self.node.log.warn(format!("Detection failed, sending raw photo: {e}"));
                    Picture::Raw(raw)
                }
            },
            None => Picture::Raw(raw),
        };
        self.held = Some(picture);

        // ---- Publishing ------------------------------------------------------
        self.state = WakeState::Publishing;
        if let Some(n) = detected {
            count::publish(&params, &self.node.log, n);
        }

        let Some(picture) = self.held.take() else {
            return;
        };
        let peer = self.node.master();
        if let Err(e) = transmit::send_photo(&self.node.messenger, &peer, picture.data()) {
            self.node
                .log
                .error(format!("Photo to {} not delivered: {e}", format_mac(&peer)));
        }
        self.release(picture);
    }

    fn release(&mut self, picture: Picture<C::Frame>) {
        match picture {
            Picture::Raw(frame) => self.camera.release(frame),
            Picture::Annotated(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeCamera};

    #[test]
    fn stays_idle_without_signal() {
        let (node, link, _) = testing::node(1_712_901_600);
        let camera = FakeCamera::with_jpeg(vec![1, 2, 3]);
        let mut cycle = WakeCycle::new(camera.clone(), None, Illumination::new(None), node);

        assert_eq!(cycle.run_once(), WakeState::Idle);
        assert_eq!(camera.captures(), 0);
        assert_eq!(link.attempts(), 0);
    }

    #[test]
    fn without_detection_sends_raw_frame_and_releases_it() {
        let (node, link, _) = testing::node(1_712_901_600);
        node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);
        let camera = FakeCamera::with_jpeg(vec![0xff, 0xd8, 9, 9]);
        let mut cycle = WakeCycle::new(camera.clone(), None, Illumination::new(None), node.clone());

        node.tasks.wake_camera(&node.signal);
        assert_eq!(cycle.run_once(), WakeState::Idle);

        assert_eq!(camera.captures(), 1);
        assert_eq!(camera.outstanding(), 0);
        assert!(!cycle.holds_picture());
        assert!(!node.tasks.is_active(TaskId::Camera));
        assert_eq!(link.reassembled(), vec![0xff, 0xd8, 9, 9]);
        assert_eq!(node.params.text(ParamId::AktualniCas), "2024-04-12 06:00:00");
    }

    #[test]
    fn capture_failure_ends_the_wake() {
        let (node, link, _) = testing::node(0);
        node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);
        let mut cycle = WakeCycle::new(FakeCamera::failing(), None, Illumination::new(None), node.clone());

        node.signal.give();
        cycle.run_once();
        assert_eq!(link.attempts(), 0);
        assert!(!cycle.holds_picture());
        assert_eq!(node.log.pending(), 1);
    }

    #[test]
    fn halt_enters_sleeping() {
        let (node, _, _) = testing::node(0);
        let mut cycle = WakeCycle::new(FakeCamera::failing(), None, Illumination::new(None), node);
        cycle.halt();
        assert_eq!(cycle.state(), WakeState::Sleeping);
    }
}
