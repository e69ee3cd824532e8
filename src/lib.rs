// Compass Relay - Library Root
//
// Orientation sensing and direction reporting for a magnetometer mounted on
// something that turns (a chair, a door, a dial).  The pipeline modules are
// plain Rust and build on the host; everything that touches ESP-IDF lives in
// `platform` and only exists on the device target.

pub mod classifier;
pub mod config;
pub mod debounce;
pub mod drivers;
pub mod events;
pub mod heading;
pub mod network;
pub mod queue;
pub mod tasks;
pub mod transport;
pub mod update;

#[cfg(target_os = "espidf")]
pub mod platform;
