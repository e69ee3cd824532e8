// Compass Relay - Network Credentials & Connectivity Seam

/// One Wi-Fi network to try, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredential {
    pub ssid: String,
    pub password: String,
}

/// Parse `ssid:password;ssid2:password2`.  The password may contain ':';
/// an entry without one is an open network.
pub fn parse_networks(list: &str) -> Vec<WifiCredential> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (ssid, password) = entry.split_once(':').unwrap_or((entry, ""));
            if ssid.is_empty() {
                log::warn!("Skipping Wi-Fi entry with empty SSID");
                return None;
            }
            Some(WifiCredential {
                ssid: ssid.to_string(),
                password: password.to_string(),
            })
        })
        .collect()
}

/// Link state as seen by the control loop.
pub trait Connectivity {
    fn is_connected(&mut self) -> bool;
    /// One bounded reconnect attempt.
    fn reconnect(&mut self) -> anyhow::Result<()>;
}

/// Runs a self-update check; only called while connected.
pub trait UpdateService {
    fn check_and_update(&mut self);
}
