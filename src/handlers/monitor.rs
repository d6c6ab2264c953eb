use axum::http::HeaderMap;
use tracing::info;

use super::{Pipeline, WebhookReply};
use crate::error::Result;
use crate::metrics::TIMES_FOUND_SENSITIVE_DATA;
use crate::webhook::Callback;

impl Pipeline {
    /// Handle a scan-completion callback for files scanned on the host.
    ///
    /// Host files are never tagged; a positive result is only counted
    /// against the configured instance name.
    pub async fn handle_host_callback(
        &self,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<WebhookReply> {
        match self.verifier.receive(body, headers)? {
            Callback::Challenge(challenge) => Ok(WebhookReply::Challenge(challenge)),
            Callback::Notification(notification) => {
                if notification.findings_present {
                    info!(
                        event = "file_detected_ec2",
                        id = %notification.upload_id,
                        "Sensitive data found on {} in upload {}",
                        self.settings.instance_name,
                        notification.upload_id
                    );
                    self.count(
                        TIMES_FOUND_SENSITIVE_DATA,
                        "EC2Instance",
                        &self.settings.instance_name,
                    );
                }
                Ok(WebhookReply::Received)
            }
        }
    }
}
