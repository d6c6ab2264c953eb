use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::chunk;
use super::{FileScan, Finding, RedactionConfig, Scanner, TextScanRequest, TextScanResult};
use crate::config::NightfallConfig;
use crate::error::{DlpGateError, Result};

/// Header carrying a chunk's byte offset within the upload.
pub const UPLOAD_OFFSET_HEADER: &str = "X-Upload-Offset";

/// Scans content through the Nightfall v3 REST API.
pub struct NightfallClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

/// Upload session opened by `POST /v3/upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    id: String,
    chunk_size: u64,
}

#[derive(Debug, Deserialize)]
struct ScanStarted {
    id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextPolicy<'a> {
    #[serde(rename = "detectionRuleUUIDs")]
    detection_rule_uuids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    default_redaction_config: Option<&'a RedactionConfig>,
}

#[derive(Debug, Serialize)]
struct TextScanBody<'a> {
    payload: &'a [String],
    policy: TextPolicy<'a>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TextScanResponse {
    findings: Vec<Vec<Finding>>,
    redacted_payload: Vec<String>,
}

impl NightfallClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &NightfallConfig) -> Self {
        Self::new(config.api_key.clone(), config.base_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fail with the step name unless the response has the expected status.
    fn expect_status(resp: &reqwest::Response, expected: StatusCode, stage: &'static str) -> Result<()> {
        if resp.status() == expected {
            Ok(())
        } else {
            Err(DlpGateError::ScanApi {
                stage,
                status: resp.status().as_u16(),
            })
        }
    }

    async fn init_upload(&self, size: usize) -> Result<UploadSession> {
        let resp = self
            .client
            .post(self.url("/v3/upload"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "fileSizeBytes": size }))
            .send()
            .await?;
        Self::expect_status(&resp, StatusCode::OK, "upload init")?;
        Ok(resp.json().await?)
    }

    async fn upload_chunk(&self, upload_id: &str, chunk: chunk::Chunk<'_>) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/v3/upload/{}", upload_id)))
            .bearer_auth(&self.api_key)
            .header(UPLOAD_OFFSET_HEADER, chunk.offset.to_string())
            .body(chunk.data.to_vec())
            .send()
            .await?;
        Self::expect_status(&resp, StatusCode::NO_CONTENT, "chunk upload")
    }

    async fn finish_upload(&self, upload_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/v3/upload/{}/finish", upload_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::expect_status(&resp, StatusCode::OK, "upload finish")
    }

    async fn start_scan(&self, upload_id: &str, policy_uuid: &str) -> Result<FileScan> {
        let resp = self
            .client
            .post(self.url(&format!("/v3/upload/{}/scan", upload_id)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "policyUUID": policy_uuid }))
            .send()
            .await?;
        Self::expect_status(&resp, StatusCode::OK, "scan request")?;
        let started: ScanStarted = resp.json().await?;
        Ok(FileScan {
            id: started.id,
            message: started.message,
        })
    }

    /// Run the init → chunks → finish sequence, returning the upload ID.
    ///
    /// Chunks are sent one at a time, in order; the first failure aborts.
    pub async fn upload(&self, data: &[u8]) -> Result<String> {
        let session = self.init_upload(data.len()).await?;
        let count = chunk::chunk_count(data.len(), session.chunk_size as usize);
        for (ix, c) in chunk::split(data, session.chunk_size)?.enumerate() {
            debug!(
                "Uploading chunk {}/{} of {} (offset {})",
                ix + 1,
                count,
                session.id,
                c.offset
            );
            self.upload_chunk(&session.id, c).await?;
        }
        self.finish_upload(&session.id).await?;
        info!("Uploaded {} bytes as {}", data.len(), session.id);
        Ok(session.id)
    }
}

#[async_trait::async_trait]
impl Scanner for NightfallClient {
    async fn scan_file(&self, data: &[u8], policy_uuid: &str) -> Result<FileScan> {
        let upload_id = self.upload(data).await?;
        self.start_scan(&upload_id, policy_uuid).await
    }

    async fn scan_text(
        &self,
        texts: &[String],
        request: &TextScanRequest,
    ) -> Result<TextScanResult> {
        let body = TextScanBody {
            payload: texts,
            policy: TextPolicy {
                detection_rule_uuids: &request.detection_rule_uuids,
                default_redaction_config: request.redaction.as_ref(),
            },
        };
        let resp = self
            .client
            .post(self.url("/v3/scan"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::expect_status(&resp, StatusCode::OK, "text scan")?;
        let parsed: TextScanResponse = resp.json().await?;
        Ok(TextScanResult {
            findings: parsed.findings,
            redacted: parsed
                .redacted_payload
                .into_iter()
                .map(|r| (!r.is_empty()).then_some(r))
                .collect(),
        })
    }
}
