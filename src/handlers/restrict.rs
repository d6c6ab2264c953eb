use tracing::{error, info};

use super::{ObjectResponse, Pipeline, TransformEvent};
use crate::error::DlpGateError;
use crate::metrics::TIMES_ACCESS_CONTROLLED;

/// Dimension value for access-control counts.
pub const ACCESS_CONTROL_POINT: &str = "dlp-access-control";

impl Pipeline {
    /// Deny reads of objects tagged sensitive; pass everything else through.
    pub async fn restrict(&self, event: &TransformEvent) -> ObjectResponse {
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

        if tags.is_sensitive() {
            self.count(TIMES_ACCESS_CONTROLLED, "ObjectLambdaAccessPoint", ACCESS_CONTROL_POINT);
            info!(event = "file_block", file = %key, "Blocked access to {}", key);
            return ObjectResponse::error(ctx, 403, "AccessDenied", "Access Denied");
        }
        ObjectResponse::ok(ctx, body, None)
    }
}

/// Bucket holding the object's tags, named by the supporting access point.
pub(super) fn supporting_bucket(event: &TransformEvent) -> Result<&str, ObjectResponse> {
    event
        .configuration
        .supporting_access_point_arn
        .as_deref()
        .ok_or_else(|| {
            ObjectResponse::error(
                &event.get_object_context,
                400,
                "InvalidRequest",
                "supportingAccessPointArn is required",
            )
        })
}

/// Map a fetch or lookup failure onto the reader's response.
pub(super) fn failure(
    ctx: &super::events::GetObjectContext,
    key: &str,
    err: DlpGateError,
) -> ObjectResponse {
    match err {
        DlpGateError::ObjectNotFound { .. } => {
            ObjectResponse::error(ctx, 404, "NoSuchKey", "The specified key does not exist.")
        }
        other => {
            error!(file = %key, "Transform of {} failed: {}", key, other);
            ObjectResponse::error(ctx, 500, "InternalError", "Failed to process object")
        }
    }
}
