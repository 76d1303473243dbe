// EggCam — Wake Cycle Scenarios
//
// Whole wakes over the host fakes: camera, codec, detector, link and flash.

use std::time::Duration;

use eggcam::clock::Clock;
use eggcam::config::{FULL_FRAME_BYTES, FULL_H, FULL_W, MTU_PAYLOAD};
use eggcam::daylight::SECONDS_PER_DAY;
use eggcam::detect::DetectionPath;
use eggcam::draw::{draw_box, Rgb888Canvas};
use eggcam::flash::{FlashLed, Illumination};
use eggcam::frame::FrameBuffers;
use eggcam::params::{CaptureMode, ParamId, ParamStore, Switch};
use eggcam::protocol::{decode, tag, Message};
use eggcam::sleep::{SleepAction, SleepSupervisor};
use eggcam::syslog::Verbosity;
use eggcam::testing::{
    self, egg, EncodeFailingCodec, FakeCamera, FakeFlash, MemoryNv, MemoryRetained, PassthroughCodec,
    ScriptedDetector,
};
use eggcam::transmit;
use eggcam::wake::{WakeCycle, WakeState};

// 2024-04-12 00:00:00 UTC
const MIDNIGHT: i64 = 1_712_880_000;
const H: i64 = 3_600;

fn grey_frame() -> Vec<u8> {
    vec![0x40; FULL_FRAME_BYTES]
}

fn detection(detector: ScriptedDetector) -> DetectionPath {
    DetectionPath::new(
        Box::new(PassthroughCodec),
        Box::new(detector),
        FrameBuffers::allocate().unwrap(),
    )
    .unwrap()
}

fn set_sun(params: &ParamStore, sunrise: i64, sunset: i64) {
    params.set(ParamId::CasVychodu, sunrise as i32);
    params.set(ParamId::CasZapadu, sunset as i32);
}

fn log_texts(node: &eggcam::node::Node) -> Vec<String> {
    node.log.drain();
    node.log.history().into_iter().map(|e| e.text).collect()
}

#[test]
fn daytime_auto_capture_counts_and_annotates() {
    let (node, link, _) = testing::node(MIDNIGHT + 12 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Auto as i32);
    node.params.set(ParamId::PoriditSnimek, Switch::Off as i32);
    set_sun(&node.params, MIDNIGHT + 6 * H, MIDNIGHT + 18 * H);

    let camera = FakeCamera::with_jpeg(grey_frame());
    let detector = ScriptedDetector::boxes(vec![
        egg(0.9, 10, 10, 12, 12),
        egg(0.7, 50, 40, 12, 12),
        egg(0.4, 70, 70, 12, 12),
    ]);
    let mut cycle = WakeCycle::new(
        camera.clone(),
        Some(detection(detector)),
        Illumination::new(None),
        node.clone(),
    );

    node.tasks.wake_camera(&node.signal);
    assert_eq!(cycle.run_once(), WakeState::Idle);

    assert_eq!(node.params.get(ParamId::PocetVajec), 2);
    assert_eq!(camera.outstanding(), 0);
    assert!(!cycle.holds_picture());

    let mut expected = grey_frame();
    let mut canvas = Rgb888Canvas::new(&mut expected, FULL_W, FULL_H);
    draw_box(&mut canvas, 33, 25, 40, 30);
    draw_box(&mut canvas, 166, 100, 40, 30);
    drop(canvas);
    assert_eq!(link.reassembled(), expected);

    let logged = log_texts(&node);
    assert!(logged.iter().any(|t| t == "Pocet vajicek se zmenil z 0 na 2"));

    // same count again: no second change entry
    node.tasks.wake_camera(&node.signal);
    cycle.run_once();
    let logged = log_texts(&node);
    assert_eq!(logged.iter().filter(|t| t.starts_with("Pocet vajicek")).count(), 1);
    assert_eq!(camera.captures(), 2);
}

#[test]
fn night_auto_skips_capture_and_goes_to_sleep() {
    let (node, link, _) = testing::node(MIDNIGHT + 22 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Auto as i32);
    set_sun(&node.params, MIDNIGHT + 6 * H, MIDNIGHT + 18 * H);

    let camera = FakeCamera::with_jpeg(grey_frame());
    let detector = ScriptedDetector::boxes(vec![egg(0.9, 1, 1, 4, 4)]);
    let seen = detector.clone();
    let mut cycle = WakeCycle::new(
        camera.clone(),
        Some(detection(detector)),
        Illumination::new(None),
        node.clone(),
    );

    node.tasks.wake_camera(&node.signal);
    cycle.run_once();
    assert_eq!(camera.captures(), 0);
    assert_eq!(seen.calls(), 0);
    assert_eq!(link.attempts(), 0);

    let mut supervisor = SleepSupervisor::new(
        node.clone(),
        Box::new(MemoryNv::default()),
        Box::new(MemoryRetained::default()),
    );
    let period = node.params.get(ParamId::PeriodaKomunikaceS) as u32;
    assert_eq!(supervisor.poll(), Some(SleepAction::DeepSleep { seconds: period }));
    assert_eq!(link.tags(), vec![tag::SLEEP]);
}

#[test]
fn manual_override_at_night_uses_flash() {
    let (node, link, clock) = testing::node(MIDNIGHT + 23 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Never as i32);
    node.params.set(ParamId::PoriditSnimek, Switch::Armed as i32);
    node.params.set(ParamId::PouzitBlesk, CaptureMode::Auto as i32);
    set_sun(&node.params, MIDNIGHT + 6 * H, MIDNIGHT + 18 * H);

    let flash = FakeFlash::default();
    let camera = FakeCamera::with_jpeg(vec![0xff, 0xd8, 0xaa, 0xff, 0xd9]);
    let mut cycle = WakeCycle::new(
        camera.clone(),
        None,
        Illumination::new(Some(Box::new(flash.clone()) as Box<dyn FlashLed>)),
        node.clone(),
    );

    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(flash.switch_ons(), 1);
    assert!(!flash.is_on());
    assert_eq!(clock.slept(), Duration::from_millis(500));
    assert_eq!(camera.captures(), 1);
    assert_eq!(node.params.get(ParamId::PoriditSnimek), Switch::Off as i32);
    assert_eq!(link.reassembled(), vec![0xff, 0xd8, 0xaa, 0xff, 0xd9]);
}

#[test]
fn never_policy_without_override_takes_no_picture() {
    let (node, link, _) = testing::node(MIDNIGHT + 12 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Never as i32);
    set_sun(&node.params, MIDNIGHT + 6 * H, MIDNIGHT + 18 * H);

    let camera = FakeCamera::with_jpeg(vec![1, 2, 3]);
    let mut cycle = WakeCycle::new(camera.clone(), None, Illumination::new(None), node.clone());
    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(camera.captures(), 0);
    assert_eq!(link.attempts(), 0);
}

#[test]
fn twelve_and_a_half_kilobytes_go_out_in_55_chunks() {
    let jpeg: Vec<u8> = (0..12_500u32).map(|i| (i % 251) as u8).collect();

    let chunks: Vec<_> = transmit::chunks(&jpeg).collect();
    assert_eq!(chunks.len(), 55);
    let last = chunks.last().unwrap();
    assert_eq!(last.offset as usize, 54 * MTU_PAYLOAD);
    assert_eq!(last.offset, 12_420);
    assert_eq!(last.payload_len(), 80);
    assert!(chunks.iter().all(|c| c.total_size == 12_500));

    let (node, link, _) = testing::node(0);
    let sent = transmit::send_photo(&node.messenger, &node.master(), &jpeg).unwrap();
    assert_eq!(sent, 55);

    let delivered = link.delivered();
    let (_, last) = delivered.last().unwrap();
    match decode(last).unwrap().1 {
        Message::ByteStream { max_mr_bytes, index, data } => {
            assert_eq!(max_mr_bytes, 12_500);
            assert_eq!(index, 12_420);
            assert_eq!(data.len(), 80);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(link.reassembled(), jpeg);
}

#[test]
fn inference_failure_sends_the_raw_photo() {
    let (node, link, _) = testing::node(MIDNIGHT + 12 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);
    node.params.set(ParamId::PocetVajec, 7);

    let raw = grey_frame();
    let camera = FakeCamera::with_jpeg(raw.clone());
    let mut cycle = WakeCycle::new(
        camera.clone(),
        Some(detection(ScriptedDetector::failing(-5))),
        Illumination::new(None),
        node.clone(),
    );

    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(node.params.get(ParamId::PocetVajec), 7);
    assert_eq!(link.reassembled(), raw);
    assert_eq!(camera.outstanding(), 0);
    assert!(!cycle.holds_picture());

    node.log.drain();
    assert!(node
        .log
        .history()
        .iter()
        .any(|e| e.verbosity == Verbosity::Warning && e.text.starts_with("Detection failed")));
}

#[test]
fn encode_failure_sends_the_raw_photo_without_a_count() {
    let (node, link, _) = testing::node(MIDNIGHT + 12 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);
    node.params.set(ParamId::PocetVajec, 7);

    let raw = grey_frame();
    let camera = FakeCamera::with_jpeg(raw.clone());
    let detector = ScriptedDetector::boxes(vec![egg(0.9, 10, 10, 12, 12), egg(0.8, 50, 40, 12, 12)]);
    let seen = detector.clone();
    let path = DetectionPath::new(
        Box::new(EncodeFailingCodec),
        Box::new(detector),
        FrameBuffers::allocate().unwrap(),
    )
    .unwrap();
    let mut cycle = WakeCycle::new(camera.clone(), Some(path), Illumination::new(None), node.clone());

    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(seen.calls(), 1);
    assert_eq!(node.params.get(ParamId::PocetVajec), 7);
    assert_eq!(link.reassembled(), raw);
    assert_eq!(camera.outstanding(), 0);

    node.log.drain();
    let warnings: Vec<_> = node
        .log
        .history()
        .into_iter()
        .filter(|e| e.verbosity == Verbosity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].text.starts_with("Detection failed"));
    assert!(warnings[0].text.contains("encoder out of memory"));
}

#[test]
fn transmit_failure_still_releases_the_frame() {
    let (node, link, _) = testing::node(0);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);
    link.fail_after(3);

    let camera = FakeCamera::with_jpeg(vec![0x55; 1_000]);
    let mut cycle = WakeCycle::new(camera.clone(), None, Illumination::new(None), node.clone());
    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(link.delivered().len(), 3);
    assert_eq!(camera.outstanding(), 0);
    assert!(!node.tasks.is_active(eggcam::sync::TaskId::Camera));
}

#[test]
fn stale_sun_times_roll_over_before_deciding() {
    let (node, link, clock) = testing::node(MIDNIGHT + 12 * H);
    node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Auto as i32);
    let yesterday = MIDNIGHT - SECONDS_PER_DAY;
    set_sun(&node.params, yesterday + 6 * H, yesterday + 18 * H);

    let camera = FakeCamera::with_jpeg(vec![0xff, 0xd8]);
    let mut cycle = WakeCycle::new(camera.clone(), None, Illumination::new(None), node.clone());
    node.tasks.wake_camera(&node.signal);
    cycle.run_once();

    assert_eq!(camera.captures(), 1);
    assert_eq!(node.params.get(ParamId::CasVychodu) as i64, MIDNIGHT + 6 * H);
    assert_eq!(node.params.get(ParamId::CasZapadu) as i64, MIDNIGHT + 18 * H);
    assert_eq!(link.reassembled(), vec![0xff, 0xd8]);
    assert_eq!(clock.now(), MIDNIGHT + 12 * H);
}

#[test]
fn retained_values_survive_deep_sleep() {
    let (node, _, _) = testing::node(0);
    node.params.set(ParamId::PocetVajec, 4);
    node.params.set(ParamId::CasVychodu, 1_712_901_600);

    let nv = MemoryNv::default();
    let retained = MemoryRetained::default();
    let mut supervisor = SleepSupervisor::new(node.clone(), Box::new(nv.clone()), Box::new(retained.clone()));
    assert!(matches!(supervisor.prepare(), SleepAction::DeepSleep { .. }));

    let woke = ParamStore::new();
    let mut nv = nv;
    woke.load(&mut nv, &retained);
    assert_eq!(woke.get(ParamId::PocetVajec), 4);
    assert_eq!(woke.get(ParamId::CasVychodu), 1_712_901_600);
}
