// EggCam — ESP-IDF Drivers
//
// Implementations of the hardware traits for the ESP32 camera boards.

pub mod camera;
pub mod espnow;
pub mod flash;
pub mod power;
pub mod storage;
