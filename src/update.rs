// Compass Relay - Self-Update
//
// Polls `<host>/version.json` on each configured host in turn.  When the
// server version is newer than the locally recorded one, every file listed in
// the manifest is downloaded into the storage root and the manifest itself is
// saved as the new local version record.  The caller restarts the device.
//
// Versions are compared as integers.  Anything that does not parse (older
// manifests used free-form strings) lets the update through.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::*;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] TransportError),
    #[error("manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking HTTP GET used by the updater.
pub trait HttpFetch {
    /// Returns the status code and the full body.
    fn get(&mut self, url: &str, timeout: Duration) -> Result<(u16, Vec<u8>), TransportError>;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    Skip,
    Proceed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Every host failed or returned a non-200 manifest.
    Unreachable,
    UpToDate,
    Applied { host: String, version: Option<Value> },
}

/// Integer view of a version: numbers truncate, strings must parse exactly.
fn version_number(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn decide(server: Option<&Value>, local: Option<&Value>) -> UpdateDecision {
    let (Some(server), Some(local)) = (server, local) else {
        return UpdateDecision::Proceed;
    };

    match (version_number(server), version_number(local)) {
        (Some(s), Some(l)) if s <= l => UpdateDecision::Skip,
        (Some(_), Some(_)) => UpdateDecision::Proceed,
        _ => {
            log::debug!("[OTA] version parse fallback, proceeding");
            UpdateDecision::Proceed
        }
    }
}

/// Relative path inside the storage root, or `None` for names that would
/// escape it.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let clean = path.components().all(|c| matches!(c, Component::Normal(_)));
    (clean && !name.is_empty()).then(|| path.to_path_buf())
}

pub struct Updater<F> {
    fetch: F,
    hosts: Vec<String>,
    root: PathBuf,
}

impl<F: HttpFetch> Updater<F> {
    pub fn new(fetch: F, hosts: Vec<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            fetch,
            hosts,
            root: root.into(),
        }
    }

    /// Updater over the configured hosts and storage mount.
    pub fn with_defaults(fetch: F) -> Self {
        Self::new(
            fetch,
            UPDATE_HOSTS.iter().map(|h| h.to_string()).collect(),
            STORAGE_BASE_PATH,
        )
    }

    pub fn local_version(&self) -> Option<Value> {
        let text = fs::read(self.root.join(LOCAL_VERSION_FILE)).ok()?;
        serde_json::from_slice::<VersionManifest>(&text).ok()?.version
    }

    pub fn check_and_update(&mut self) -> UpdateOutcome {
        for host in self.hosts.clone() {
            match self.check_host(&host) {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => continue,
                Err(e) => log::warn!("[OTA] Error from {}: {}", host, e),
            }
        }
        UpdateOutcome::Unreachable
    }

    /// `Ok(None)` means "try the next host".
    fn check_host(&mut self, host: &str) -> Result<Option<UpdateOutcome>, UpdateError> {
        let manifest_url = format!("{}/{}", host, MANIFEST_NAME);
        let (status, body) = self
            .fetch
            .get(&manifest_url, Duration::from_millis(HTTP_TIMEOUT_MS))?;
        if status != 200 {
            log::debug!("[OTA] {} -> HTTP {}", manifest_url, status);
            return Ok(None);
        }

        let manifest: VersionManifest = serde_json::from_slice(&body)?;
        let current = self.local_version();

        if decide(manifest.version.as_ref(), current.as_ref()) == UpdateDecision::Skip {
            log::info!(
                "[OTA] v{} <= v{}, skip",
                display_version(&manifest.version),
                display_version(&current)
            );
            return Ok(Some(UpdateOutcome::UpToDate));
        }

        log::info!(
            "[OTA] New version {} found (current: {}). Syncing files...",
            display_version(&manifest.version),
            display_version(&current)
        );

        for name in &manifest.files {
            self.sync_file(host, name)?;
        }

        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(LOCAL_VERSION_FILE), &body)?;
        log::info!("[OTA] Update complete");

        Ok(Some(UpdateOutcome::Applied {
            host: host.to_string(),
            version: manifest.version,
        }))
    }

    fn sync_file(&mut self, host: &str, name: &str) -> Result<(), UpdateError> {
        let Some(relative) = safe_relative_path(name) else {
            log::warn!("[OTA] Refusing file outside storage: {}", name);
            return Ok(());
        };

        log::info!(" - Downloading: {}", name);
        let (status, data) = self.fetch.get(
            &format!("{}/{}", host, name),
            Duration::from_millis(HTTP_DOWNLOAD_TIMEOUT_MS),
        )?;
        if status != 200 {
            log::warn!("[OTA] {} -> HTTP {}, keeping old copy", name, status);
            return Ok(());
        }

        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, data)?;
        Ok(())
    }
}

fn display_version(v: &Option<Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "none".to_string(),
    }
}
