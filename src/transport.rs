// Compass Relay - Direction Transport
//
// Two backends, chosen at build time:
//   - Local: POST {"dir": "<name>"} to a relay on the LAN.
//   - Cloud: POST a contact-state event to the smart-home action API, one
//     device id per direction.
//
// Request construction is pure so it can be checked on the host; the actual
// HTTP exchange lives in `platform::http`.

use serde::Serialize;
use thiserror::Error;

use crate::config::*;
use crate::events::Direction;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("no cloud device id configured for {0}")]
    MissingDevice(Direction),
    #[error("request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends one direction event and returns the HTTP status on success.
pub trait Transport {
    fn send(&mut self, direction: Direction) -> Result<u16, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, direction: Direction) -> Result<u16, TransportError> {
        (**self).send(direction)
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Cloud device id per direction, indexed by [`Direction::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIds([Option<String>; 4]);

impl DeviceIds {
    /// Parse `north=ID,east=ID,south=ID,west=ID`.  Unknown names are ignored
    /// with a warning; missing ones surface at send time.
    pub fn parse(list: &str) -> Self {
        let mut ids: [Option<String>; 4] = Default::default();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((name, id)) => match Direction::from_name(name.trim()) {
                    Some(dir) => ids[dir.index()] = Some(id.trim().to_string()),
                    None => log::warn!("Ignoring device id for unknown direction '{}'", name),
                },
                None => log::warn!("Ignoring malformed device id entry '{}'", entry),
            }
        }
        Self(ids)
    }

    pub fn get(&self, direction: Direction) -> Option<&str> {
        self.0[direction.index()].as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Local {
        url: String,
    },
    Cloud {
        api_key: String,
        url_template: String,
        device_ids: DeviceIds,
    },
}

/// A fully built POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct LocalPayload {
    dir: Direction,
}

#[derive(Serialize)]
struct ContactState<'a> {
    state: &'a str,
}

#[derive(Serialize)]
struct CloudPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    action: &'a str,
    // the action API expects the value as an embedded JSON string
    value: String,
}

impl Backend {
    /// Backend described by the build-time environment (`local` by default).
    pub fn from_build_env() -> anyhow::Result<Self> {
        Self::from_settings(RELAY_MODE, CLOUD_API_KEY, CLOUD_DEVICE_IDS)
    }

    pub fn from_settings(
        mode: Option<&str>,
        api_key: Option<&str>,
        device_ids: Option<&str>,
    ) -> anyhow::Result<Self> {
        match mode.unwrap_or("local") {
            "local" => Ok(Self::Local {
                url: LOCAL_RELAY_URL.to_string(),
            }),
            "cloud" => {
                let api_key = api_key
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("cloud mode requires COMPASS_CLOUD_API_KEY"))?;
                Ok(Self::Cloud {
                    api_key: api_key.to_string(),
                    url_template: CLOUD_ACTION_URL_TEMPLATE.to_string(),
                    device_ids: DeviceIds::parse(device_ids.unwrap_or("")),
                })
            }
            other => anyhow::bail!("unknown relay mode '{}' (expected local or cloud)", other),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Cloud { .. } => "cloud",
        }
    }

    pub fn request_for(&self, direction: Direction) -> Result<HttpRequest, TransportError> {
        match self {
            Self::Local { url } => Ok(HttpRequest {
                url: url.clone(),
                headers: vec![("Content-Type", "application/json".to_string())],
                body: serde_json::to_vec(&LocalPayload { dir: direction })?,
            }),
            Self::Cloud {
                api_key,
                url_template,
                device_ids,
            } => {
                let device_id = device_ids
                    .get(direction)
                    .ok_or(TransportError::MissingDevice(direction))?;
                let payload = CloudPayload {
                    kind: "event",
                    action: "setContactState",
                    value: serde_json::to_string(&ContactState { state: "open" })?,
                };
                Ok(HttpRequest {
                    url: url_template.replace("{device_id}", device_id),
                    headers: vec![
                        (CLOUD_API_KEY_HEADER, api_key.clone()),
                        ("Content-Type", "application/json".to_string()),
                    ],
                    body: serde_json::to_vec(&payload)?,
                })
            }
        }
    }
}
