// Compass Relay - Device Updater
//
// Wraps the portable `Updater` with the ESP-IDF HTTP client and restarts the
// chip once new files are on flash.

use std::thread;
use std::time::Duration;

use crate::config::*;
use crate::network::UpdateService;
use crate::platform::http::EspHttpFetch;
use crate::update::{UpdateOutcome, Updater};

pub struct DeviceUpdater {
    updater: Updater<EspHttpFetch>,
}

impl DeviceUpdater {
    pub fn new() -> Self {
        Self {
            updater: Updater::with_defaults(EspHttpFetch),
        }
    }
}

impl UpdateService for DeviceUpdater {
    fn check_and_update(&mut self) {
        match self.updater.check_and_update() {
            UpdateOutcome::Applied { host, .. } => {
                log::info!("[OTA] Applied update from {}. Resetting...", host);
                thread::sleep(Duration::from_millis(RESTART_DELAY_MS));
                esp_idf_hal::reset::restart();
            }
            UpdateOutcome::UpToDate => {}
            UpdateOutcome::Unreachable => log::warn!("[OTA] No update host reachable"),
        }
    }
}
