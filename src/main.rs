// EggCam — Firmware Entry Point
//
// Boot sequence:
//   1. Restore parameters (NVS + RTC image) and the log history.
//   2. Record the reset cause.
//   3. Bring up the detector scratch buffers, camera, flash and ESP-NOW.
//   4. Spawn the log, ESP-NOW dispatcher, ESP-NOW client, camera and sleep
//      tasks.
//
// The boot ends in the sleep task: once every other task is idle it saves
// state, tells the gateway and enters deep sleep (or restarts on request).

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(all(not(target_os = "espidf"), feature = "testing"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(all(not(target_os = "espidf"), not(feature = "testing")))]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::warn!(
        "EggCam {} targets ESP-IDF; build with `--features testing` for the host simulation",
        build_info()
    );
    Ok(())
}

fn build_info() -> String {
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    format!("{} {}", env!("CARGO_PKG_VERSION"), profile)
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use eggcam::clock::Clock;
    use eggcam::codec::ImageCodec;
    use eggcam::config::*;
    use eggcam::detect::DetectionPath;
    use eggcam::drivers::camera::EspCamera;
    use eggcam::drivers::espnow::EspNowLink;
    use eggcam::drivers::flash::GpioFlash;
    use eggcam::drivers::power::{reset_code, EspClock, EspPower};
    use eggcam::drivers::storage::{NvsStore, RtcRetained};
    use eggcam::ei;
    use eggcam::flash::{FlashLed, Illumination};
    use eggcam::frame::FrameBuffers;
    use eggcam::node::Node;
    use eggcam::params::{ParamId, ParamStore};
    use eggcam::reset;
    use eggcam::sleep::SleepSupervisor;
    use eggcam::sync::TaskId;
    use eggcam::syslog::SystemLog;
    use eggcam::tasks;
    use eggcam::wake::WakeCycle;

    pub fn run() -> anyhow::Result<()> {
        // Link esp-idf-sys runtime patches and initialise logging.
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("EggCam {} starting…", super::build_info());

        // ---- Peripherals ------------------------------------------------------
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs_partition = EspDefaultNvsPartition::take()?;

        // ---- Parameters & log history -----------------------------------------
        let clock: Arc<dyn Clock> = Arc::new(EspClock);
        let mut nv = NvsStore::new(nvs_partition.clone())?;
        let retained = RtcRetained::new();

        let params = Arc::new(ParamStore::new());
        params.load(&mut nv, &retained);
        params.set_text(ParamId::CompDate, &super::build_info());

        let tz = params.text(ParamId::PopisCasu);
        if !tz.is_empty() {
            clock.set_timezone(&tz);
        }

        let syslog = Arc::new(SystemLog::new(Arc::clone(&clock)));
        syslog.load(&mut nv);
        reset::record(&params, &syslog, reset::classify(reset_code()));

        // ---- Detection path ---------------------------------------------------
        // Without scratch memory the node still sends unannotated photos.
        let detection = FrameBuffers::allocate()
            .and_then(|buffers| DetectionPath::new(Box::new(ImageCodec), ei::default_detector(), buffers));
        let detection = match detection {
            Ok(path) => Some(path),
            Err(e) => {
                syslog.error(format!("Detection disabled: {e}"));
                None
            }
        };

        // ---- Camera & flash ---------------------------------------------------
        let camera = match EspCamera::new() {
            Ok(camera) => Some(camera),
            Err(e) => {
                syslog.error(format!("Camera init failed: {e:#}"));
                None
            }
        };

        let led = FLASH_PIN.and_then(|gpio| match GpioFlash::new(gpio) {
            Ok(flash) => Some(Box::new(flash) as Box<dyn FlashLed>),
            Err(e) => {
                log::warn!("Flash LED unavailable: {:#}", e);
                None
            }
        });
        let flash = Illumination::new(led);

        // ---- ESP-NOW ----------------------------------------------------------
        let channel = params.get(ParamId::WiFiKanal).clamp(1, 13) as u8;
        let link = Arc::new(EspNowLink::new(peripherals.modem, sysloop, nvs_partition, channel)?);

        // ---- Shared state -----------------------------------------------------
        let node = Node::new(params, syslog, clock, link);
        // Busy before any task runs, so the supervisor cannot sleep early.
        node.tasks.set_active(TaskId::EspNowClient, true);
        let (ack_tx, ack_rx) = mpsc::channel();

        // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) --------------
        let log_node = node.clone();
        spawn("log", STACK_LOG, PRIORITY_LOW, move || tasks::log::log_task(log_node))?;

        let dispatcher_node = node.clone();
        spawn("espnow", STACK_ESPNOW, PRIORITY_HIGH, move || {
            tasks::espnow::dispatcher_task(dispatcher_node, ack_tx)
        })?;

        let client_node = node.clone();
        spawn("client", STACK_CLIENT, PRIORITY_LOW, move || {
            tasks::espnow::client_task(client_node, ack_rx)
        })?;

        let registry = Arc::clone(&node.tasks);
        let cycle = WakeCycle::new(camera, detection, flash, node.clone());
        spawn("camera", STACK_CAMERA, PRIORITY_LOW, move || tasks::camera::camera_task(cycle, registry))?;

        let supervisor = SleepSupervisor::new(node, Box::new(nv), Box::new(retained));
        spawn("sleep", STACK_SLEEP, PRIORITY_LOW, move || {
            tasks::sleep::sleep_task(supervisor, EspPower);
        })?;

        // Main thread has nothing left to do, park it until the sleep task
        // powers the chip down.
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }

    /// Spawn a named FreeRTOS-backed thread at `priority`.
    fn spawn<F>(name: &'static str, stack_size: usize, priority: u8, f: F) -> anyhow::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadSpawnConfiguration {
            priority,
            ..Default::default()
        }
        .set()?;
        let spawned = thread::Builder::new()
            .name(name.into())
            .stack_size(stack_size)
            .spawn(f);
        ThreadSpawnConfiguration::default().set()?;
        spawned?;
        Ok(())
    }
}

/// Host build: one simulated wake over in-memory fakes, for trying the
/// pipeline without a board.
#[cfg(all(not(target_os = "espidf"), feature = "testing"))]
mod host {
    use eggcam::codec::{ImageCodec, JpegCodec};
    use eggcam::config::{FULL_H, FULL_W};
    use eggcam::detect::DetectionPath;
    use eggcam::flash::Illumination;
    use eggcam::frame::FrameBuffers;
    use eggcam::params::{CaptureMode, ParamId};
    use eggcam::testing::{self, FakeCamera, ScriptedDetector};
    use eggcam::wake::WakeCycle;

    pub fn run() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("EggCam {} host simulation", super::build_info());

        let (node, link, _clock) = testing::node(1_700_000_000);
        node.params.set(ParamId::KonfiguraceSnimani, CaptureMode::Always as i32);

        let gray = vec![128u8; FULL_W * FULL_H * 3];
        let jpeg = ImageCodec.encode_rgb888(&gray, FULL_W, FULL_H, 90)?;
        let camera = FakeCamera::with_jpeg(jpeg);

        let detector = ScriptedDetector::boxes(vec![
            testing::egg(0.9, 10, 10, 12, 14),
            testing::egg(0.8, 50, 40, 12, 12),
            testing::egg(0.3, 70, 70, 10, 10),
        ]);
        let detection = DetectionPath::new(Box::new(ImageCodec), Box::new(detector), FrameBuffers::allocate()?)?;

        let mut cycle = WakeCycle::new(camera, Some(detection), Illumination::new(None), node.clone());
        node.tasks.wake_camera(&node.signal);
        cycle.run_once();
        node.log.drain();

        log::info!(
            "Counted {} eggs, photo of {} bytes in {} datagrams",
            node.params.get(ParamId::PocetVajec),
            link.reassembled().len(),
            link.delivered().len()
        );
        Ok(())
    }
}
