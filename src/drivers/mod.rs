pub mod qmc5883l;

use crate::events::RawSample;

pub use qmc5883l::{Qmc5883l, SensorError};

/// Source of validated magnetometer samples for the control loop.
pub trait MagSensor {
    /// Block until a plausible sample is read, retrying internally.
    fn read_stable(&mut self) -> Result<RawSample, SensorError>;
}
