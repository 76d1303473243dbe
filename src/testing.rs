// EggCam — Host Test Doubles
//
// In-memory stand-ins for every driver seam, shared by the unit tests and
// the integration tests under tests/. Each fake is cheaply cloneable; clones
// share state so a test can keep a handle after handing the fake over.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::capture::Camera;
use crate::clock::Clock;
use crate::codec::JpegCodec;
use crate::config::{ESPNOW_MAX_DATA_LEN, FULL_H, FULL_W, MODEL_H, MODEL_W};
use crate::ei::{BoundingBox, DetectionResult, ObjectDetector, Signal, Timing};
use crate::error::{Error, LinkError, Result};
use crate::flash::FlashLed;
use crate::frame::Frame;
use crate::link::{Inbound, Link, MacAddr};
use crate::node::Node;
use crate::params::{NvBackend, ParamStore, RetainedBackend, RetainedImage};
use crate::protocol::{decode, Datagram, Message};
use crate::sync::lock;
use crate::syslog::SystemLog;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------
pub type TestNode = (Node, Arc<RecordingLink>, Arc<FakeClock>);

/// Fresh node at Unix time `now` with default parameters.
pub fn node(now: i64) -> TestNode {
    let clock = Arc::new(FakeClock::new(now));
    let link = Arc::new(RecordingLink::new());
    let node = Node::new(
        Arc::new(ParamStore::new()),
        Arc::new(SystemLog::new(clock.clone())),
        clock.clone(),
        link.clone(),
    );
    (node, link, clock)
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------
#[derive(Default)]
struct CameraState {
    template: Option<Frame>,
    captures: usize,
    released: usize,
    outstanding: usize,
}

/// Hands out copies of one frame; `failing()` never produces a frame.
#[derive(Clone, Default)]
pub struct FakeCamera(Arc<Mutex<CameraState>>);

impl FakeCamera {
    pub fn with_frame(frame: Frame) -> Self {
        Self(Arc::new(Mutex::new(CameraState { template: Some(frame), ..Default::default() })))
    }

    /// A JPEG-tagged QVGA frame holding `bytes`.
    pub fn with_jpeg(bytes: Vec<u8>) -> Self {
        Self::with_frame(Frame::jpeg(bytes, FULL_W, FULL_H))
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn captures(&self) -> usize {
        lock(&self.0).captures
    }

    pub fn released(&self) -> usize {
        lock(&self.0).released
    }

    /// Frames captured and not yet released.
    pub fn outstanding(&self) -> usize {
        lock(&self.0).outstanding
    }
}

impl Camera for FakeCamera {
    type Frame = Frame;

    fn capture(&mut self) -> Result<Frame> {
        let mut state = lock(&self.0);
        let frame = state
            .template
            .clone()
            .ok_or_else(|| Error::Capture("camera returned no frame".into()))?;
        state.captures += 1;
        state.outstanding += 1;
        Ok(frame)
    }

    fn release(&mut self, _frame: Frame) {
        let mut state = lock(&self.0);
        state.released += 1;
        state.outstanding = state.outstanding.saturating_sub(1);
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------
#[derive(Default)]
struct LinkState {
    attempts: usize,
    delivered: Vec<(MacAddr, Vec<u8>)>,
    fail_next: usize,
    fail_after: Option<usize>,
    inbound: VecDeque<Inbound>,
}

/// Records every submission; can be told to drop datagrams.
#[derive(Default)]
pub struct RecordingLink {
    state: Mutex<LinkState>,
    arrived: Condvar,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions.
    pub fn fail_next(&self, n: usize) {
        lock(&self.state).fail_next = n;
    }

    /// Fail every submission once `n` datagrams have been delivered.
    pub fn fail_after(&self, n: usize) {
        lock(&self.state).fail_after = Some(n);
    }

    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }

    pub fn delivered(&self) -> Vec<(MacAddr, Vec<u8>)> {
        lock(&self.state).delivered.clone()
    }

    /// Tags of the delivered datagrams, in order.
    pub fn tags(&self) -> Vec<u8> {
        self.delivered().iter().filter_map(|(_, d)| d.first().copied()).collect()
    }

    /// Concatenated payload of every delivered BYTE_STREAM datagram.
    pub fn reassembled(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (_, datagram) in self.delivered() {
            if let Ok((_, Message::ByteStream { data, .. })) = decode(&datagram) {
                out.extend_from_slice(data);
            }
        }
        out
    }

    /// Queue a datagram for `recv`.
    pub fn push_inbound(&self, src: MacAddr, data: &[u8]) {
        let data = Datagram::from_slice(&data[..data.len().min(ESPNOW_MAX_DATA_LEN)])
            .unwrap_or_default();
        lock(&self.state).inbound.push_back(Inbound { src, data });
        self.arrived.notify_all();
    }
}

impl Link for RecordingLink {
    fn send(&self, peer: &MacAddr, data: &[u8]) -> std::result::Result<(), LinkError> {
        let mut state = lock(&self.state);
        state.attempts += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LinkError::NoAck);
        }
        if state.fail_after.is_some_and(|n| state.delivered.len() >= n) {
            return Err(LinkError::NoAck);
        }
        state.delivered.push((*peer, data.to_vec()));
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Option<Inbound> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        loop {
            if let Some(inbound) = state.inbound.pop_front() {
                return Some(inbound);
            }
            let left = deadline.checked_duration_since(Instant::now())?;
            state = self
                .arrived
                .wait_timeout(state, left)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------
/// Wall clock that only moves when told to; delays are recorded, not slept.
#[derive(Default)]
pub struct FakeClock {
    now: AtomicI64,
    slept: Mutex<Duration>,
    timezone: Mutex<String>,
}

impl FakeClock {
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now), ..Default::default() }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Sum of all requested delays.
    pub fn slept(&self) -> Duration {
        *lock(&self.slept)
    }

    pub fn timezone(&self) -> String {
        lock(&self.timezone).clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay(&self, duration: Duration) {
        *lock(&self.slept) += duration;
    }

    fn set_now(&self, unix_time: i64) {
        self.now.store(unix_time, Ordering::SeqCst);
    }

    fn set_timezone(&self, tz: &str) {
        *lock(&self.timezone) = tz.to_owned();
    }
}

// ---------------------------------------------------------------------------
// Inference & codec
// ---------------------------------------------------------------------------
#[derive(Clone)]
enum Script {
    Boxes(Vec<BoundingBox>),
    Fail(i32),
}

struct DetectorState {
    script: Script,
    calls: usize,
    last_input: Vec<f32>,
}

/// Model stand-in with a fixed answer; remembers what it was shown.
#[derive(Clone)]
pub struct ScriptedDetector(Arc<Mutex<DetectorState>>);

impl ScriptedDetector {
    fn scripted(script: Script) -> Self {
        Self(Arc::new(Mutex::new(DetectorState { script, calls: 0, last_input: Vec::new() })))
    }

    pub fn boxes(boxes: Vec<BoundingBox>) -> Self {
        Self::scripted(Script::Boxes(boxes))
    }

    /// Every run fails with classifier error `code`.
    pub fn failing(code: i32) -> Self {
        Self::scripted(Script::Fail(code))
    }

    pub fn calls(&self) -> usize {
        lock(&self.0).calls
    }

    pub fn last_input(&self) -> Vec<f32> {
        lock(&self.0).last_input.clone()
    }
}

impl ObjectDetector for ScriptedDetector {
    fn input_size(&self) -> (usize, usize) {
        (MODEL_W, MODEL_H)
    }

    fn detect(&mut self, signal: &Signal<'_>) -> Result<DetectionResult> {
        let mut input = vec![0.0f32; signal.total_length];
        signal
            .get_data(0, &mut input)
            .map_err(|_| Error::Inference(-1))?;

        let mut state = lock(&self.0);
        state.calls += 1;
        state.last_input = input;
        match &state.script {
            Script::Boxes(boxes) => Ok(DetectionResult {
                boxes: boxes.clone(),
                timing: Timing { dsp_ms: 1, classification_ms: 10 },
            }),
            Script::Fail(code) => Err(Error::Inference(*code)),
        }
    }
}

/// `egg` box with the given confidence and model-pixel geometry.
pub fn egg(value: f32, x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
    BoundingBox { label: "egg".into(), value, x, y, width, height }
}

/// Treats "JPEG" bytes as raw RGB888 so tests can inspect the annotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCodec;

impl JpegCodec for PassthroughCodec {
    fn decode_rgb888(&mut self, jpeg: &[u8], out: &mut [u8], width: usize, height: usize) -> Result<()> {
        let len = width * height * 3;
        if jpeg.len() != len || out.len() < len {
            return Err(Error::Decode(format!("expected {len} raw bytes, got {}", jpeg.len())));
        }
        out[..len].copy_from_slice(jpeg);
        Ok(())
    }

    fn encode_rgb888(&mut self, rgb: &[u8], width: usize, height: usize, _quality: u8) -> Result<Vec<u8>> {
        let len = width * height * 3;
        rgb.get(..len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Encode("short buffer".into()))
    }
}

/// Decodes like `PassthroughCodec` but cannot encode.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodeFailingCodec;

impl JpegCodec for EncodeFailingCodec {
    fn decode_rgb888(&mut self, jpeg: &[u8], out: &mut [u8], width: usize, height: usize) -> Result<()> {
        PassthroughCodec.decode_rgb888(jpeg, out, width, height)
    }

    fn encode_rgb888(&mut self, _rgb: &[u8], _width: usize, _height: usize, _quality: u8) -> Result<Vec<u8>> {
        Err(Error::Encode("encoder out of memory".into()))
    }
}

// ---------------------------------------------------------------------------
// Flash
// ---------------------------------------------------------------------------
#[derive(Default)]
struct FlashState {
    on: bool,
    switch_ons: usize,
}

#[derive(Clone, Default)]
pub struct FakeFlash(Arc<Mutex<FlashState>>);

impl FakeFlash {
    pub fn is_on(&self) -> bool {
        lock(&self.0).on
    }

    /// Off-to-on transitions so far.
    pub fn switch_ons(&self) -> usize {
        lock(&self.0).switch_ons
    }
}

impl FlashLed for FakeFlash {
    fn set(&mut self, on: bool) {
        let mut state = lock(&self.0);
        if on && !state.on {
            state.switch_ons += 1;
        }
        state.on = on;
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------
#[derive(Clone, Default)]
pub struct MemoryNv {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryNv {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).cloned()
    }
}

impl NvBackend for MemoryNv {
    fn load(&mut self, key: &str, buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
        let entries = lock(&self.entries);
        let Some(blob) = entries.get(key) else {
            return Ok(None);
        };
        anyhow::ensure!(blob.len() <= buf.len(), "blob {key} is {} bytes", blob.len());
        buf[..blob.len()].copy_from_slice(blob);
        Ok(Some(blob.len()))
    }

    fn store(&mut self, key: &str, data: &[u8]) -> anyhow::Result<()> {
        lock(&self.entries).insert(key.to_owned(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// RTC memory stand-in; starts out as after a power-on.
#[derive(Clone)]
pub struct MemoryRetained(Arc<Mutex<RetainedImage>>);

impl Default for MemoryRetained {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(RetainedImage::EMPTY)))
    }
}

impl MemoryRetained {
    pub fn image(&self) -> RetainedImage {
        *lock(&self.0)
    }

    pub fn set_image(&self, image: RetainedImage) {
        *lock(&self.0) = image;
    }
}

impl RetainedBackend for MemoryRetained {
    fn read(&self) -> RetainedImage {
        self.image()
    }

    fn write(&mut self, image: &RetainedImage) {
        self.set_image(*image);
    }
}
