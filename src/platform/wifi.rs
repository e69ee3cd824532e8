// Compass Relay - Wi-Fi Manager
//
// Tries each configured network in order until one connects.  Used once at
// boot (failure is fatal there) and again by the control loop whenever the
// periodic liveness check finds the link down.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::config::*;
use crate::network::{Connectivity, WifiCredential};

pub struct WifiManager {
    wifi: BlockingWifi<EspWifi<'static>>,
    networks: Vec<WifiCredential>,
}

impl WifiManager {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        networks: Vec<WifiCredential>,
    ) -> anyhow::Result<Self> {
        let wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;
        Ok(Self { wifi, networks })
    }

    /// Connect to the first reachable network, waiting up to `timeout` each.
    pub fn connect(&mut self, timeout: Duration) -> anyhow::Result<()> {
        if self.wifi.is_connected()? {
            log::debug!("WiFi already connected");
            return Ok(());
        }
        if self.networks.is_empty() {
            anyhow::bail!("COMPASS_WIFI_NETWORKS is empty");
        }

        for cred in self.networks.clone() {
            match self.try_network(&cred, timeout) {
                Ok(true) => {
                    if BATTERY_MODE {
                        enable_power_save();
                    }
                    return Ok(());
                }
                Ok(false) => log::warn!("   timeout: {}", cred.ssid),
                Err(e) => log::warn!("   connect error: {} {:#}", cred.ssid, e),
            }
        }

        Err(anyhow!("WiFi connect failed"))
    }

    fn try_network(&mut self, cred: &WifiCredential, timeout: Duration) -> anyhow::Result<bool> {
        log::info!(" - try SSID: {}", cred.ssid);

        let config = Configuration::Client(ClientConfiguration {
            ssid: cred
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID too long: {}", cred.ssid))?,
            password: cred
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("password too long for {}", cred.ssid))?,
            auth_method: if cred.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        self.wifi.set_configuration(&config)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }

        // non-blocking connect, then poll so each network gets its own deadline
        self.wifi.wifi_mut().connect()?;
        let start = Instant::now();
        while !self.wifi.is_connected()? {
            if start.elapsed() > timeout {
                let _ = self.wifi.wifi_mut().disconnect();
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(WIFI_POLL_MS));
        }

        self.wifi.wait_netif_up()?;
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        log::info!("Connected. IP: {}", ip_info.ip);
        Ok(true)
    }
}

impl Connectivity for WifiManager {
    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        self.connect(Duration::from_millis(WIFI_RECONNECT_TIMEOUT_MS))
    }
}

/// Let the radio doze between beacons; the association is kept.
fn enable_power_save() {
    let ret =
        unsafe { esp_idf_sys::esp_wifi_set_ps(esp_idf_sys::wifi_ps_type_t_WIFI_PS_MAX_MODEM) };
    if ret == esp_idf_sys::ESP_OK {
        log::info!("[POWER] WiFi power-save enabled");
    } else {
        log::warn!("[POWER] WiFi PM set failed ({})", ret);
    }
}
