// Compass Relay - Hardware & System Configuration
// Target: Seeed Studio Xiao ESP32-C3 (RISC-V) + QMC5883L magnetometer

use std::time::Duration;

use crate::heading::HeadingCalibration;

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_BAUDRATE_KHZ: u32 = 10; // slow bus survives long jumper wires
pub const I2C_ADDR_QMC5883L: u8 = 0x0D;

// ---------------------------------------------------------------------------
// Sensor acquisition
// ---------------------------------------------------------------------------
pub const BAD_MIN: i16 = i16::MIN; // sentinel the chip reports on a glitched conversion
pub const READ_RETRY: u32 = 12;
pub const DRDY_WAIT_MS: u32 = 250;
pub const DRDY_POLL_MS: u32 = 5;

// ---------------------------------------------------------------------------
// Calibration (hard-iron offsets measured with the mounting bracket attached)
// ---------------------------------------------------------------------------
pub const X_OFFSET: f64 = 798.0;
pub const Y_OFFSET: f64 = 270.5;
pub const NORTH_DEG_RAW: f64 = 151.0; // raw bearing observed when facing calibrated north

// ---------------------------------------------------------------------------
// Direction decision
// ---------------------------------------------------------------------------
pub const WINDOW_DEG: f64 = 22.0;          // capture window around each target
pub const RELEASE_EXTRA_DEG: f64 = 15.0;   // extra distance before re-arming
pub const COOLDOWN_MS: u64 = 2000;         // same-direction re-fire guard
pub const EMA_ALPHA: f64 = 0.2;            // weight of the newest sample
pub const STABLE_COUNT_THRESHOLD: u32 = 5; // consecutive identical classifications

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const LOOP_PERIOD_MS: u64 = 120;
pub const LOOP_ERROR_PAUSE_MS: u64 = 100;
pub const TELEMETRY_INTERVAL_MS: u64 = 500;
pub const SEND_INTERVAL_MS: u64 = 500;
pub const PENDING_STALE_MS: u64 = 3000;
pub const WIFI_CHECK_INTERVAL_MS: u64 = 10_000;
pub const WIFI_BOOT_TIMEOUT_MS: u64 = 20_000;
pub const WIFI_RECONNECT_TIMEOUT_MS: u64 = 10_000;
pub const WIFI_POLL_MS: u64 = 500;
pub const UPDATE_INTERVAL_MS: u64 = 3_600_000;     // 1 hour
pub const HTTP_TIMEOUT_MS: u64 = 5000;
pub const HTTP_DOWNLOAD_TIMEOUT_MS: u64 = 10_000;
pub const RESTART_DELAY_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_COMPASS: usize = 16 * 1024; // HTTP client + TLS handshake

// ---------------------------------------------------------------------------
// Direction transport
// ---------------------------------------------------------------------------
pub const LOCAL_RELAY_URL: &str = "http://192.168.4.118:5000/direction";
pub const CLOUD_ACTION_URL_TEMPLATE: &str = "https://api.sinric.pro/api/v1/devices/{device_id}/action";
pub const CLOUD_API_KEY_HEADER: &str = "X-SINRIC-API-KEY";

// ---------------------------------------------------------------------------
// Self-update
// ---------------------------------------------------------------------------
pub const UPDATE_HOSTS: [&str; 3] = [
    "http://192.168.4.118:8080",
    "http://raspberrypi3modelB.local:8080",
    "http://192.168.0.116:8080",
];
pub const MANIFEST_NAME: &str = "version.json";
pub const LOCAL_VERSION_FILE: &str = "version.json";
pub const STORAGE_BASE_PATH: &str = "/storage";
pub const STORAGE_PARTITION_LABEL: &str = "storage";
pub const STORAGE_MAX_FILES: usize = 8;

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------
pub const BATTERY_MODE: bool = true; // modem power save + quieter logging

// ---------------------------------------------------------------------------
// Build-time environment (kept out of the source tree)
// ---------------------------------------------------------------------------
pub const WIFI_NETWORKS: Option<&str> = option_env!("COMPASS_WIFI_NETWORKS");
pub const RELAY_MODE: Option<&str> = option_env!("COMPASS_RELAY_MODE");
pub const CLOUD_API_KEY: Option<&str> = option_env!("COMPASS_CLOUD_API_KEY");
pub const CLOUD_DEVICE_IDS: Option<&str> = option_env!("COMPASS_DEVICE_IDS");

/// Decision and timing parameters for the sensing pipeline.
///
/// `Default` mirrors the constants above; tests build their own.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub calibration: HeadingCalibration,
    pub ema_alpha: f64,
    pub window_deg: f64,
    pub release_extra_deg: f64,
    pub stable_count_threshold: u32,
    pub cooldown: Duration,
    pub send_interval: Duration,
    pub stale_after: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration: HeadingCalibration {
                x_offset: X_OFFSET,
                y_offset: Y_OFFSET,
                north_deg_raw: NORTH_DEG_RAW,
            },
            ema_alpha: EMA_ALPHA,
            window_deg: WINDOW_DEG,
            release_extra_deg: RELEASE_EXTRA_DEG,
            stable_count_threshold: STABLE_COUNT_THRESHOLD,
            cooldown: Duration::from_millis(COOLDOWN_MS),
            send_interval: Duration::from_millis(SEND_INTERVAL_MS),
            stale_after: Duration::from_millis(PENDING_STALE_MS),
        }
    }
}
