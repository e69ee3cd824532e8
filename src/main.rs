// Compass Relay - Firmware Entry Point
//
// Boot sequence:
//   1. Select the direction transport from the build environment.
//   2. Connect to Wi-Fi (fatal if no configured network answers).
//   3. Mount flash storage and run one self-update check.
//   4. Initialise the QMC5883L on I2C.
//   5. Spawn the compass task, which runs the control loop forever.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::thread;
    use std::time::{Duration, Instant};

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use compass_relay::config::*;
    use compass_relay::drivers::Qmc5883l;
    use compass_relay::network::{parse_networks, UpdateService};
    use compass_relay::platform::http::EspHttpTransport;
    use compass_relay::platform::ota::DeviceUpdater;
    use compass_relay::platform::storage;
    use compass_relay::platform::wifi::WifiManager;
    use compass_relay::tasks::compass::{ControlLoop, Pipeline};
    use compass_relay::transport::Backend;

    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Compass Relay firmware starting...");

    let backend = Backend::from_build_env()?;
    log::info!("Starting Mode: {} (BATTERY:{})", backend.mode_name(), BATTERY_MODE);

    // ---- Peripherals ------------------------------------------------------
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ---- Wi-Fi ------------------------------------------------------------
    let networks = parse_networks(WIFI_NETWORKS.unwrap_or(""));
    let mut wifi = WifiManager::new(peripherals.modem, sys_loop, nvs, networks)?;
    wifi.connect(Duration::from_millis(WIFI_BOOT_TIMEOUT_MS))?;

    // ---- Storage + self-update --------------------------------------------
    if let Err(e) = storage::mount() {
        // the loop still runs; update writes will fail and be logged
        log::error!("{:#}", e);
    }
    let mut updater = DeviceUpdater::new();
    updater.check_and_update();

    if BATTERY_MODE {
        log::set_max_level(log::LevelFilter::Info);
    }

    // ---- I2C + magnetometer -----------------------------------------------
    let i2c_config = I2cConfig::new().baudrate(I2C_BAUDRATE_KHZ.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio6, // D4 - SDA
        peripherals.pins.gpio7, // D5 - SCL
        &i2c_config,
    )?;
    let mut compass = Qmc5883l::new(i2c, FreeRtos);
    if let Err(e) = compass.init() {
        // read_stable re-initialises on its own; keep going
        log::error!("QMC5883L init failed: {}", e);
    }

    // ---- Compass task -----------------------------------------------------
    let transport = EspHttpTransport::new(backend);
    let pipeline = Pipeline::new(&PipelineConfig::default());
    let control = ControlLoop::new(pipeline, compass, transport, wifi, updater, Instant::now());

    thread::Builder::new()
        .name("compass".into())
        .stack_size(STACK_COMPASS)
        .spawn(move || control.run())?;

    // Main thread has nothing left to do, park it forever.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("compass-relay runs on ESP-IDF targets only; use `cargo test` on the host");
}
