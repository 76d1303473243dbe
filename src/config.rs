// EggCam — Hardware & System Configuration
// Target: Espressif ESP-EYE v2.1 (default) or AI-Thinker ESP32-CAM
// (`--features board-ai-thinker`).

// ---------------------------------------------------------------------------
// Camera Pin Map (DVP + SCCB)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy)]
pub struct CameraPins {
    pub pwdn: i32,
    pub reset: i32,
    pub xclk: i32,
    pub sccb_sda: i32,
    pub sccb_scl: i32,
    /// D0..D7
    pub data: [i32; 8],
    pub vsync: i32,
    pub href: i32,
    pub pclk: i32,
}

#[cfg(feature = "board-ai-thinker")]
pub const CAMERA_PINS: CameraPins = CameraPins {
    pwdn: 32,
    reset: -1,
    xclk: 0,
    sccb_sda: 26,
    sccb_scl: 27,
    data: [5, 18, 19, 21, 36, 39, 34, 35],
    vsync: 25,
    href: 23,
    pclk: 22,
};

/// On-board white LED.
#[cfg(feature = "board-ai-thinker")]
pub const FLASH_PIN: Option<i32> = Some(4);

#[cfg(not(feature = "board-ai-thinker"))]
pub const CAMERA_PINS: CameraPins = CameraPins {
    pwdn: -1,
    reset: -1,
    xclk: 4,
    sccb_sda: 18,
    sccb_scl: 23,
    data: [34, 13, 14, 35, 39, 38, 37, 36],
    vsync: 5,
    href: 27,
    pclk: 25,
};

/// The ESP-EYE LED shares its line with XCLK, so there is no flash.
#[cfg(not(feature = "board-ai-thinker"))]
pub const FLASH_PIN: Option<i32> = None;

pub const CAMERA_XCLK_HZ: i32 = 20_000_000;

// ---------------------------------------------------------------------------
// Image Geometry
// ---------------------------------------------------------------------------
pub const FULL_W: usize = 320; // QVGA
pub const FULL_H: usize = 240;
pub const RGB888_BYTES: usize = 3;
pub const FULL_FRAME_BYTES: usize = FULL_W * FULL_H * RGB888_BYTES; // 230 400

/// Edge Impulse model input (must match the exported impulse).
pub const MODEL_W: usize = 96;
pub const MODEL_H: usize = 96;
pub const MODEL_FRAME_BYTES: usize = MODEL_W * MODEL_H * RGB888_BYTES;

// ---------------------------------------------------------------------------
// Detection & Annotation
// ---------------------------------------------------------------------------
/// Only boxes at least this confident are counted and drawn.
pub const CONF_THRESHOLD: f32 = 0.60;
pub const MAX_BOXES: usize = 32;
pub const BOX_THICKNESS: u32 = 2;
pub const BOX_COLOR: [u8; 3] = [255, 0, 0];
pub const ANNOTATED_JPEG_QUALITY: u8 = 80; // 0-100
/// Sensor-side quality, 0-63; lower is better on OV sensors.
pub const CAPTURE_JPEG_QUALITY: i32 = 10;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const FLASH_SETTLE_MS: u64 = 500;          // AEC/AGC convergence
pub const WAKE_SIGNAL_TIMEOUT_MS: u64 = 300;
pub const LOG_DRAIN_INTERVAL_MS: u64 = 200;
pub const SLEEP_POLL_INTERVAL_MS: u64 = 10;
pub const HALT_TIMEOUT_MS: u64 = 1000;        // task loops exiting before sleep
pub const GATEWAY_REPLY_TIMEOUT_MS: u64 = 1500;
pub const SEND_ACK_TIMEOUT_MS: u64 = 200;      // per datagram
pub const LINK_RECV_POLL_MS: u64 = 100;

// ---------------------------------------------------------------------------
// ESP-NOW Link
// ---------------------------------------------------------------------------
pub const ESPNOW_MAX_DATA_LEN: usize = 250;
pub const MTU_PAYLOAD: usize = 230;
pub const SEND_ATTEMPTS: u32 = 5;
pub const SLEEP_NOTICE_ATTEMPTS: u32 = 1;
pub const INBOUND_QUEUE_DEPTH: usize = 8;
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes) & Priorities
// ---------------------------------------------------------------------------
pub const STACK_LOG: usize = 4096;
pub const STACK_ESPNOW: usize = 4096;
pub const STACK_CLIENT: usize = 4096;
pub const STACK_CAMERA: usize = 16384; // JPEG codec + inference
pub const STACK_SLEEP: usize = 4096;

pub const PRIORITY_LOW: u8 = 1;
pub const PRIORITY_HIGH: u8 = 5;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------
pub const MAIN_REVISION: i32 = 18;
pub const LOG_HISTORY_LEN: usize = 16;
pub const NVS_NAMESPACE: &str = "params";
