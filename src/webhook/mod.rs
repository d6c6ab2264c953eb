//! Signed webhook callbacks from the scanning service.
//!
//! Each callback carries two headers: `X-Nightfall-Timestamp` and
//! `X-Nightfall-Signature`. The signature is the lower-case hex HMAC-SHA256,
//! keyed with the shared signing secret, of
//!
//! ```text
//! {timestamp}:{canonical JSON body}
//! ```
//!
//! where the canonical body is produced by [`canonical::canonical_json`].
//!
//! [`SignatureVerifier::receive`] runs the full intake sequence and yields a
//! [`Callback`]: either an endpoint-registration challenge to echo back, or a
//! verified [`ScanNotification`].

pub mod canonical;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{DlpGateError, Result};

pub use canonical::canonical_json;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-nightfall-signature";
pub const TIMESTAMP_HEADER: &str = "x-nightfall-timestamp";

/// A verified scan-completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNotification {
    pub upload_id: String,
    pub findings_present: bool,
}

/// What an inbound callback turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// Endpoint registration: echo the value back as plain text.
    Challenge(String),
    Notification(ScanNotification),
}

/// Verifies webhook signatures with the shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    max_skew_secs: Option<u64>,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            max_skew_secs: None,
        }
    }

    /// Reject timestamps further than `secs` from the current time.
    pub fn with_max_skew(mut self, secs: Option<u64>) -> Self {
        self.max_skew_secs = secs;
        self
    }

    fn mac(&self, timestamp: &str, canonical_body: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC takes any key size");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(canonical_body.as_bytes());
        mac
    }

    /// Lower-case hex signature of `timestamp:canonical_body`.
    pub fn sign(&self, timestamp: &str, canonical_body: &str) -> String {
        hex::encode(self.mac(timestamp, canonical_body).finalize().into_bytes())
    }

    /// Check `signature` against `timestamp:canonical_body` in constant time.
    pub fn verify(&self, timestamp: &str, canonical_body: &str, signature: &str) -> Result<()> {
        let provided = hex::decode(signature).map_err(|_| DlpGateError::InvalidSignature)?;
        self.mac(timestamp, canonical_body)
            .verify_slice(&provided)
            .map_err(|_| DlpGateError::InvalidSignature)
    }

    fn check_freshness(&self, timestamp: &str, now: i64) -> Result<()> {
        let Some(max_skew) = self.max_skew_secs else {
            return Ok(());
        };
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| DlpGateError::StaleTimestamp)?;
        if now.abs_diff(ts) > max_skew {
            return Err(DlpGateError::StaleTimestamp);
        }
        Ok(())
    }

    /// Validate an inbound callback and classify it.
    ///
    /// Order of checks: non-empty JSON object body, challenge short-circuit,
    /// required headers, timestamp window (if configured), signature, then
    /// the `uploadID` and `findingsPresent` fields.
    pub fn receive(&self, body: &[u8], headers: &HeaderMap) -> Result<Callback> {
        self.receive_at(body, headers, chrono::Utc::now().timestamp())
    }

    pub fn receive_at(&self, body: &[u8], headers: &HeaderMap, now: i64) -> Result<Callback> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(DlpGateError::MalformedPayload("empty body".to_string()));
        }
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| DlpGateError::MalformedPayload(e.to_string()))?;
        let Some(fields) = payload.as_object() else {
            return Err(DlpGateError::MalformedPayload(
                "body is not a JSON object".to_string(),
            ));
        };

        if let Some(challenge) = fields.get("challenge") {
            let echo = match challenge {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Callback::Challenge(echo));
        }

        let signature = header(headers, SIGNATURE_HEADER)?;
        let timestamp = header(headers, TIMESTAMP_HEADER)?;

        self.check_freshness(timestamp, now)?;
        self.verify(timestamp, &canonical_json(&payload)?, signature)?;

        let upload_id = fields
            .get("uploadID")
            .and_then(Value::as_str)
            .ok_or_else(|| DlpGateError::MalformedPayload("missing uploadID".to_string()))?;
        let findings_present = fields
            .get("findingsPresent")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                DlpGateError::MalformedPayload("missing findingsPresent".to_string())
            })?;

        Ok(Callback::Notification(ScanNotification {
            upload_id: upload_id.to_string(),
            findings_present,
        }))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(DlpGateError::MissingHeader(name))
}
