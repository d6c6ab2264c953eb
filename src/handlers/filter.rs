use tracing::{info, warn};

use super::restrict::{failure, supporting_bucket};
use super::{ObjectResponse, Pipeline, TransformEvent};
use crate::metrics::TIMES_FILTERED;
use crate::scan::{RedactionConfig, TextScanRequest};

/// Dimension value for redaction counts.
pub const FILTER_POINT: &str = "dlp-filter-info";

const UNSUPPORTED_MESSAGE: &str = "This access point only supports filtering text files";

impl Pipeline {
    /// Return objects tagged sensitive with findings masked; pass everything
    /// else through unchanged.
    pub async fn filter(&self, event: &TransformEvent) -> ObjectResponse {
        let ctx = &event.get_object_context;
        let bucket = match supporting_bucket(event) {
            Ok(bucket) => bucket,
            Err(resp) => return resp,
        };
        let key = event.object_key();

        let body = match self.source.fetch(&ctx.input_url).await {
            Ok(body) => body,
            Err(e) => return failure(ctx, &key, e),
        };
        let tags = match self.objects.get_tags(bucket, &key).await {
            Ok(tags) => tags,
            Err(e) => return failure(ctx, &key, e),
        };
        if !tags.is_sensitive() {
            return ObjectResponse::ok(ctx, body, None);
        }

        let text = match String::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %key, "Refusing to filter non-text object {}: {}", key, e);
                return ObjectResponse::error(ctx, 400, "Unsupported", UNSUPPORTED_MESSAGE);
            }
        };

        let request = TextScanRequest {
            detection_rule_uuids: self.settings.detection_rules.clone(),
            redaction: Some(RedactionConfig::masked()),
        };
        let texts = [text];
        let result = match self.scanner.scan_text(&texts, &request).await {
            Ok(result) => result,
            Err(e) => return failure(ctx, &key, e),
        };

        self.count(TIMES_FILTERED, "ObjectLambdaAccessPoint", FILTER_POINT);
        info!(event = "file_filter", file = %key, "Filtered {}", key);

        let [text] = texts;
        let out = match result.redacted(0) {
            Some(redacted) => redacted.to_string(),
            None => text,
        };
        ObjectResponse::ok(ctx, out.into_bytes(), Some("text/plain"))
    }
}
