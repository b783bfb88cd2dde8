// GyroWatch — gyro-to-spectrum-to-display firmware core
//
// The pure pipeline pieces (ring buffer, spectral engine, bar mapper, frame
// surface) live in the library so their unit tests stay colocated; the
// binary wires them to the ESP32 peripherals.

pub mod config;
pub mod drivers;
pub mod events;
pub mod fft;
pub mod fft_display;
pub mod input;
pub mod ringbuf;
#[cfg(target_os = "espidf")]
pub mod streamer;
#[cfg(target_os = "espidf")]
pub mod tasks;
