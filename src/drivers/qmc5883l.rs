// Compass Relay - QMC5883L Magnetometer Driver
//
// Register-level driver over any embedded-hal 1.0 I2C bus.  The ESP-IDF
// `I2cDriver` plugs in on the device; tests use a scripted fake bus.
//
// The chip occasionally returns garbage on a noisy bus: either the -32768
// sentinel or an all-zero frame.  `read_stable` retries those, and after the
// retry budget is spent it re-runs the init sequence so the next tick starts
// from a freshly configured sensor.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use thiserror::Error;

use crate::config::*;
use crate::drivers::MagSensor;
use crate::events::RawSample;

// QMC5883L register addresses
const REG_DATA_X_LSB: u8 = 0x00; // Start of 6-byte X/Y/Z burst (little-endian)
const REG_STATUS: u8 = 0x06;
const REG_CONTROL_1: u8 = 0x09;
const REG_CONTROL_2: u8 = 0x0A;
const REG_SET_RESET_PERIOD: u8 = 0x0B;

const STATUS_DRDY: u8 = 0x01;
const CONTROL_2_SOFT_RESET: u8 = 0x80;
const CONTROL_1_CONTINUOUS: u8 = 0xD1; // OSR 64, ±8 G, 10 Hz, continuous
const SET_RESET_PERIOD: u8 = 0x01;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("I2C bus error: {0}")]
    Bus(String),
    #[error("no stable reading after {attempts} attempts")]
    Unstable { attempts: u32 },
}

/// Retry and data-ready polling budget for one `read_stable` call.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionConfig {
    pub retry: u32,
    pub drdy_wait_ms: u32,
    pub drdy_poll_ms: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            retry: READ_RETRY,
            drdy_wait_ms: DRDY_WAIT_MS,
            drdy_poll_ms: DRDY_POLL_MS,
        }
    }
}

pub struct Qmc5883l<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    acquisition: AcquisitionConfig,
}

impl<I2C, D> Qmc5883l<I2C, D> {
    pub fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn destroy(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C: I2c, D: DelayNs> Qmc5883l<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, I2C_ADDR_QMC5883L, AcquisitionConfig::default())
    }

    pub fn with_config(i2c: I2C, delay: D, address: u8, acquisition: AcquisitionConfig) -> Self {
        Self {
            i2c,
            delay,
            address,
            acquisition,
        }
    }

    /// Soft reset, then continuous mode and the recommended set/reset period.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.write_reg(REG_CONTROL_2, CONTROL_2_SOFT_RESET)?;
        self.delay.delay_ms(100);

        self.write_reg(REG_CONTROL_1, CONTROL_1_CONTINUOUS)?;
        self.delay.delay_ms(20);

        self.write_reg(REG_SET_RESET_PERIOD, SET_RESET_PERIOD)?;
        self.delay.delay_ms(20);

        log::info!("QMC5883L initialised (continuous, 10Hz, ±8G)");
        Ok(())
    }

    /// Re-run the init sequence after a read failure.  Errors are only logged:
    /// the next `read_stable` gets another chance either way.
    pub fn reinitialize(&mut self) {
        log::warn!("Re-initialising QMC5883L");
        if let Err(e) = self.init() {
            log::error!("QMC5883L re-init failed: {}", e);
        }
    }

    pub fn read_status(&mut self) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[REG_STATUS], &mut buf)
            .map_err(bus_error)?;
        Ok(buf[0])
    }

    /// One burst read of X, Y, Z without any validation.
    pub fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        let mut raw = [0u8; 6];
        self.i2c
            .write_read(self.address, &[REG_DATA_X_LSB], &mut raw)
            .map_err(bus_error)?;

        Ok(RawSample {
            x: i16::from_le_bytes([raw[0], raw[1]]),
            y: i16::from_le_bytes([raw[2], raw[3]]),
            z: i16::from_le_bytes([raw[4], raw[5]]),
        })
    }

    /// Poll the DRDY bit.  Returns `false` on timeout; callers read anyway.
    fn wait_data_ready(&mut self) -> bool {
        let poll_ms = self.acquisition.drdy_poll_ms.max(1);
        let max_polls = (self.acquisition.drdy_wait_ms / poll_ms).max(1);

        for _ in 0..max_polls {
            if let Ok(status) = self.read_status() {
                if status & STATUS_DRDY != 0 {
                    return true;
                }
            }
            self.delay.delay_ms(poll_ms);
        }
        false
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), SensorError> {
        self.i2c.write(self.address, &[reg, val]).map_err(bus_error)
    }
}

impl<I2C: I2c, D: DelayNs> MagSensor for Qmc5883l<I2C, D> {
    fn read_stable(&mut self) -> Result<RawSample, SensorError> {
        for attempt in 1..=self.acquisition.retry {
            if !self.wait_data_ready() {
                log::debug!("DRDY timeout (attempt {})", attempt);
            }
            match self.read_raw() {
                Ok(sample) if is_glitch(&sample) => {
                    log::debug!("Rejected glitch sample {:?} (attempt {})", sample, attempt);
                }
                Ok(sample) => return Ok(sample),
                Err(e) => log::debug!("Read failed (attempt {}): {}", attempt, e),
            }
        }

        self.reinitialize();
        Err(SensorError::Unstable {
            attempts: self.acquisition.retry,
        })
    }
}

/// Sentinel on any axis, or no horizontal field at all.
fn is_glitch(sample: &RawSample) -> bool {
    sample.x == BAD_MIN
        || sample.y == BAD_MIN
        || sample.z == BAD_MIN
        || (sample.x == 0 && sample.y == 0)
}

fn bus_error<E: core::fmt::Debug>(e: E) -> SensorError {
    SensorError::Bus(format!("{:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation, SevenBitAddress};
    use pretty_assertions::assert_eq;

    /// Scripted QMC5883L: status reads report ready unless scripted,
    /// data reads pop frames from `frames`.
    #[derive(Default)]
    struct FakeBus {
        status: VecDeque<Result<u8, ErrorKind>>,
        frames: VecDeque<Result<[u8; 6], ErrorKind>>,
        writes: Vec<(u8, u8)>,
        pointer: u8,
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            _address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        self.pointer = bytes[0];
                        if bytes.len() == 2 {
                            self.writes.push((bytes[0], bytes[1]));
                        }
                    }
                    Operation::Read(buf) => match self.pointer {
                        REG_STATUS => buf[0] = self.status.pop_front().unwrap_or(Ok(STATUS_DRDY))?,
                        REG_DATA_X_LSB => {
                            let frame = self.frames.pop_front().unwrap_or(Err(ErrorKind::Other))?;
                            buf.copy_from_slice(&frame);
                        }
                        _ => buf.fill(0),
                    },
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        total_ns: u64,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    fn frame(x: i16, y: i16, z: i16) -> Result<[u8; 6], ErrorKind> {
        let (x, y, z) = (x.to_le_bytes(), y.to_le_bytes(), z.to_le_bytes());
        Ok([x[0], x[1], y[0], y[1], z[0], z[1]])
    }

    fn sensor(bus: FakeBus) -> Qmc5883l<FakeBus, RecordingDelay> {
        Qmc5883l::new(bus, RecordingDelay::default())
    }

    const INIT_WRITES: [(u8, u8); 3] = [
        (REG_CONTROL_2, CONTROL_2_SOFT_RESET),
        (REG_CONTROL_1, CONTROL_1_CONTINUOUS),
        (REG_SET_RESET_PERIOD, SET_RESET_PERIOD),
    ];

    #[test]
    fn init_writes_reset_and_mode() {
        let mut qmc = sensor(FakeBus::default());
        qmc.init().unwrap();
        assert_eq!(qmc.i2c().writes, INIT_WRITES.to_vec());
    }

    #[test]
    fn decodes_little_endian_axes() {
        let mut bus = FakeBus::default();
        bus.frames.push_back(Ok([0x34, 0x12, 0xFF, 0xFF, 0x05, 0x00]));
        let mut qmc = sensor(bus);

        let s = qmc.read_stable().unwrap();
        assert_eq!(s, RawSample { x: 0x1234, y: -1, z: 5 });
    }

    #[test]
    fn retries_past_glitches_and_bus_errors() {
        let mut bus = FakeBus::default();
        bus.frames.extend([
            frame(0, 0, 0),
            frame(BAD_MIN, 10, 10),
            frame(10, 10, BAD_MIN),
            Err(ErrorKind::Bus),
            frame(-120, 340, 17),
        ]);
        let mut qmc = sensor(bus);

        let s = qmc.read_stable().unwrap();
        assert_eq!(s, RawSample { x: -120, y: 340, z: 17 });
        assert!(qmc.i2c().frames.is_empty());
        assert!(qmc.i2c().writes.is_empty(), "no re-init on success");
    }

    #[test]
    fn zero_xy_with_field_on_z_is_rejected() {
        let mut bus = FakeBus::default();
        bus.frames.extend([frame(0, 0, 900), frame(1, 0, 900)]);
        let mut qmc = sensor(bus);
        assert_eq!(qmc.read_stable().unwrap(), RawSample { x: 1, y: 0, z: 900 });
    }

    #[test]
    fn exhaustion_reinitializes_and_reports() {
        let mut bus = FakeBus::default();
        bus.frames.extend((0..READ_RETRY).map(|_| frame(0, 0, 0)));
        bus.frames.push_back(frame(50, 50, 50));
        let mut qmc = sensor(bus);

        let err = qmc.read_stable().unwrap_err();
        assert!(matches!(err, SensorError::Unstable { attempts: READ_RETRY }));
        assert_eq!(qmc.i2c().writes, INIT_WRITES.to_vec());

        // the retry budget stops exactly at READ_RETRY frames
        assert_eq!(qmc.i2c().frames.len(), 1);
        assert_eq!(qmc.read_stable().unwrap(), RawSample { x: 50, y: 50, z: 50 });
    }

    #[test]
    fn data_ready_wait_is_bounded() {
        let mut bus = FakeBus::default();
        let polls = (DRDY_WAIT_MS / DRDY_POLL_MS) as usize;
        bus.status.extend(std::iter::repeat(Ok(0u8)).take(polls + 3));
        bus.frames.push_back(frame(7, 8, 9));
        let mut qmc = sensor(bus);

        // never ready within the window, but the read still happens
        assert_eq!(qmc.read_stable().unwrap(), RawSample { x: 7, y: 8, z: 9 });
        assert_eq!(qmc.i2c().status.len(), 3);

        let (_, delay) = qmc.destroy();
        assert_eq!(delay.total_ns, u64::from(DRDY_WAIT_MS) * 1_000_000);
    }

    #[test]
    fn status_errors_during_wait_are_ignored() {
        let mut bus = FakeBus::default();
        bus.status.extend([Err(ErrorKind::Bus), Err(ErrorKind::Other), Ok(STATUS_DRDY)]);
        bus.frames.push_back(frame(-40, 25, 3));
        let mut qmc = sensor(bus);

        assert_eq!(qmc.read_stable().unwrap(), RawSample { x: -40, y: 25, z: 3 });
        assert!(qmc.i2c().status.is_empty());
        assert!(qmc.i2c().writes.is_empty(), "no re-init for a status error");

        // one poll delay per failed status read
        let (_, delay) = qmc.destroy();
        assert_eq!(delay.total_ns, 2 * u64::from(DRDY_POLL_MS) * 1_000_000);
    }
}
