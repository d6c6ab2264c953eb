//! Client side of the external scanning service.
//!
//! Content inspection is entirely delegated: the pipeline uploads bytes or
//! submits text and acts on what comes back. The [`Scanner`] trait is the
//! seam handlers depend on; [`nightfall::NightfallClient`] implements it
//! against the Nightfall v3 REST API. File uploads are split with
//! [`chunk::split`].

pub mod chunk;
pub mod nightfall;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use nightfall::NightfallClient;

/// Outcome of submitting a file for asynchronous scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileScan {
    /// Identifier echoed back in the webhook callback.
    pub id: String,
    pub message: Option<String>,
}

/// Character masking applied to findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskConfig {
    pub masking_char: char,
    pub chars_to_ignore: Vec<char>,
}

/// How findings are rewritten in the redacted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionConfig {
    pub remove_finding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_config: Option<MaskConfig>,
}

impl RedactionConfig {
    /// Mask findings with `*`, leaving `@` and `.` visible so addresses keep their shape.
    pub fn masked() -> Self {
        Self {
            remove_finding: true,
            mask_config: Some(MaskConfig {
                masking_char: '*',
                chars_to_ignore: vec!['@', '.'],
            }),
        }
    }
}

/// Parameters for a synchronous text scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextScanRequest {
    pub detection_rule_uuids: Vec<String>,
    pub redaction: Option<RedactionConfig>,
}

/// Detector that produced a finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Detector {
    pub name: String,
    pub uuid: String,
}

/// A single detection in a scanned text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Finding {
    pub finding: String,
    pub redacted_finding: Option<String>,
    pub detector: Detector,
    pub confidence: String,
}

/// Result of a text scan, one entry per submitted text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextScanResult {
    pub findings: Vec<Vec<Finding>>,
    /// Redacted text, or `None` where nothing was redacted.
    pub redacted: Vec<Option<String>>,
}

impl TextScanResult {
    /// Redacted version of the `ix`-th text, if the service produced one.
    pub fn redacted(&self, ix: usize) -> Option<&str> {
        self.redacted.get(ix).and_then(|r| r.as_deref())
    }
}

/// External content scanner.
#[async_trait::async_trait]
pub trait Scanner: Send + Sync {
    /// Upload `data` and request an asynchronous scan under `policy_uuid`.
    async fn scan_file(&self, data: &[u8], policy_uuid: &str) -> Result<FileScan>;

    /// Scan texts synchronously, returning findings and redactions.
    async fn scan_text(&self, texts: &[String], request: &TextScanRequest)
        -> Result<TextScanResult>;
}
