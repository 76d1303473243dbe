// EggCam — Nest Camera Node
//
// Battery-powered ESP32 camera that wakes on a timer, photographs a nest,
// counts the eggs with an on-device detector, draws a box around each one
// and sends the annotated photo plus the count to its ESP-NOW gateway before
// going back to deep sleep.
//
// The pipeline talks to hardware only through the traits in `capture`,
// `codec`, `ei`, `flash`, `link`, `clock`, `params` and `sleep`, so
// everything except `drivers` also builds and tests on the host.

pub mod capture;
pub mod clock;
pub mod codec;
pub mod config;
pub mod count;
pub mod daylight;
pub mod detect;
pub mod draw;
pub mod ei;
pub mod error;
pub mod flash;
pub mod frame;
pub mod link;
pub mod node;
pub mod params;
pub mod protocol;
pub mod reset;
pub mod sleep;
pub mod sync;
pub mod syslog;
pub mod tasks;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transmit;
pub mod wake;

#[cfg(target_os = "espidf")]
pub mod drivers;

pub use error::{Error, Result};
