//! `GalileoClient` — posts the XML envelope over HTTP(S) and decodes the
//! server's reply.
//!
//! Ground truth: `galileo/net.py::GalileoClient`.

use rand::Rng;

use tracker_core::bytes::from_base64;
use tracker_core::SyncError;

use crate::envelope::{build_request, parse_response, Mode, ServerResponse};

/// Posts `galileo-client`/`galileo-server` envelopes to a configured URL.
pub struct GalileoClient {
    http: reqwest::blocking::Client,
    url: String,
    client_version: String,
}

impl GalileoClient {
    pub fn new(url: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            url: url.into(),
            client_version: client_version.into(),
        }
    }

    fn post(&self, body: &str) -> Result<ServerResponse, SyncError> {
        tracing::debug!(body, "posting to galileo server");
        let resp = self
            .http
            .post(&self.url)
            .header("Content-Type", "text/xml")
            .body(body.to_string())
            .send()
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        let text = resp
            .error_for_status()
            .map_err(|e| SyncError::Connection(e.to_string()))?
            .text()
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        tracing::debug!(response = %text, "server reply");

        let parsed = parse_response(&text)?;
        if let Some(msg) = &parsed.error {
            return Err(SyncError::SyncRejected(msg.clone()));
        }
        if let Some((min, max)) = parsed.back_off {
            return Err(SyncError::BackOff {
                min_ms: min,
                max_ms: max,
            });
        }
        Ok(parsed)
    }

    /// A no-op check-in: success means only that the server accepted and
    /// validated the envelope.
    pub fn request_status(&self) -> Result<(), SyncError> {
        let body = build_request(&self.client_version, Mode::Status, None, None)?;
        self.post(&body)?;
        Ok(())
    }

    /// Exchange a base64-encoded dump for the decoded response bytes.
    pub fn sync(
        &self,
        dongle_version: (u8, u8),
        tracker_id_hex: &str,
        dump_b64: &str,
    ) -> Result<Vec<u8>, SyncError> {
        let body = build_request(
            &self.client_version,
            Mode::Sync,
            Some(dongle_version),
            Some((tracker_id_hex, dump_b64)),
        )?;
        let resp = self.post(&body)?;

        let returned_id = resp
            .tracker_id
            .ok_or_else(|| SyncError::SyncRejected("missing tracker in response".into()))?;
        if returned_id != tracker_id_hex {
            tracing::error!(
                got = %returned_id,
                expected = %tracker_id_hex,
                "response for unexpected tracker"
            );
            return Err(SyncError::SyncRejected(format!(
                "response tracker-id {returned_id} does not match requested {tracker_id_hex}"
            )));
        }
        if resp.tracker_type.as_deref() != Some("megadumpresponse") {
            tracing::error!(kind = ?resp.tracker_type, "not a megadumpresponse");
        }

        let data = resp
            .data
            .ok_or_else(|| SyncError::SyncRejected("no data".into()))?;
        from_base64(&data).map_err(|e| SyncError::InvalidDump(e.to_string()))
    }
}

/// A server-instructed wait range, as carried by `SyncError::BackOff`.
///
/// Ground truth: `galileo/net.py::BackOffException.getAValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackOff {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl BackOff {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Pick a uniform wait duration from the range.
    pub fn sample(&self) -> u64 {
        if self.min_ms >= self.max_ms {
            return self.min_ms;
        }
        rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
    }
}
