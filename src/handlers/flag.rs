use axum::http::HeaderMap;
use tracing::{info, warn};

use super::{Pipeline, WebhookReply};
use crate::error::Result;
use crate::metrics::TIMES_FLAGGED;
use crate::objects::{TagSet, NIGHTFALL_ID_TAG, SENSITIVE_DATA_TAG};
use crate::webhook::{Callback, ScanNotification};

impl Pipeline {
    /// Handle a scan-completion callback for stored objects.
    ///
    /// Objects whose scan found something are tagged sensitive so that
    /// [`Pipeline::restrict`] denies reads of them afterwards.
    pub async fn handle_storage_callback(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookReply> {
        match self.verifier.receive(body, headers)? {
            Callback::Challenge(challenge) => Ok(WebhookReply::Challenge(challenge)),
            Callback::Notification(notification) => {
                self.flag(&notification).await?;
                Ok(WebhookReply::Received)
            }
        }
    }

    async fn flag(&self, notification: &ScanNotification) -> Result<()> {
        if !notification.findings_present {
            return Ok(());
        }
        let upload_id = &notification.upload_id;
        let Some(record) = self.uploads.get(upload_id)? else {
            warn!(
                event = "file_detect",
                id = %upload_id,
                "No stored object recorded for upload {}",
                upload_id
            );
            return Ok(());
        };

        self.count(TIMES_FLAGGED, "Bucket", &record.bucket);
        info!(
            event = "file_detect",
            file = %record.key,
            id = %upload_id,
            "Sensitive data found in {}",
            record.key
        );

        let tags = TagSet::from_pairs([
            (SENSITIVE_DATA_TAG, "True"),
            (NIGHTFALL_ID_TAG, upload_id.as_str()),
        ]);
        self.objects.put_tags(&record.bucket, &record.key, &tags).await
    }
}
