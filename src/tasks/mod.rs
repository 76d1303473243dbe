// EggCam — Task Loops
//
// Each loop runs on its own `std::thread` (a FreeRTOS task under ESP-IDF)
// and exits once the task registry is halted.

pub mod camera;
pub mod espnow;
pub mod log;
pub mod sleep;
