// Compass Relay - ESP-IDF HTTP Client
//
// One connection per request, each with an explicit timeout.  HTTPS (cloud
// backend) verifies against the ESP-IDF certificate bundle.

use std::time::Duration;

use embedded_svc::http::client::Client;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};

use crate::config::*;
use crate::events::Direction;
use crate::transport::{Backend, Transport, TransportError};
use crate::update::HttpFetch;

fn connection_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Connection(format!("{:?}", e))
}

fn client(timeout: Duration) -> Result<Client<EspHttpConnection>, TransportError> {
    let connection = EspHttpConnection::new(&HttpConfiguration {
        timeout: Some(timeout),
        crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
        ..Default::default()
    })
    .map_err(connection_error)?;
    Ok(Client::wrap(connection))
}

fn read_body<R: Read>(response: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = response.read(&mut buf).map_err(connection_error)?;
        if n == 0 {
            return Ok(body);
        }
        body.extend_from_slice(&buf[..n]);
    }
}

// ---------------------------------------------------------------------------
// Direction transport
// ---------------------------------------------------------------------------

pub struct EspHttpTransport {
    backend: Backend,
    timeout: Duration,
}

impl EspHttpTransport {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            timeout: Duration::from_millis(HTTP_TIMEOUT_MS),
        }
    }
}

impl Transport for EspHttpTransport {
    fn send(&mut self, direction: Direction) -> Result<u16, TransportError> {
        let req = self.backend.request_for(direction)?;
        let content_length = req.body.len().to_string();
        let mut headers: Vec<(&str, &str)> =
            req.headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        headers.push(("Content-Length", &content_length));

        let mut client = client(self.timeout)?;
        let mut request = client.post(&req.url, &headers).map_err(connection_error)?;
        request.write_all(&req.body).map_err(connection_error)?;
        request.flush().map_err(connection_error)?;

        let mut response = request.submit().map_err(connection_error)?;
        let status = response.status();
        let body = read_body(&mut response)?;
        log::debug!("{} -> {} ({} bytes)", req.url, status, body.len());

        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(TransportError::Status(status))
        }
    }
}

// ---------------------------------------------------------------------------
// Plain GET for the updater
// ---------------------------------------------------------------------------

pub struct EspHttpFetch;

impl HttpFetch for EspHttpFetch {
    fn get(&mut self, url: &str, timeout: Duration) -> Result<(u16, Vec<u8>), TransportError> {
        let mut client = client(timeout)?;
        let request = client.get(url).map_err(connection_error)?;
        let mut response = request.submit().map_err(connection_error)?;
        let status = response.status();
        let body = read_body(&mut response)?;
        Ok((status, body))
    }
}
