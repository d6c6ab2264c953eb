//! Event shapes the handlers consume and produce.

use serde::{Deserialize, Serialize};

/// Storage notification for newly created objects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectRef {
    pub key: String,
}

impl StorageEvent {
    /// Build a single-record event.
    pub fn single(bucket: &str, key: &str) -> Self {
        Self {
            records: vec![StorageRecord {
                s3: StorageEntity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: key.to_string(),
                    },
                },
            }],
        }
    }
}

/// Object-transform invocation: a reader asked for an object and the
/// transform decides what they get back.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformEvent {
    pub get_object_context: GetObjectContext,
    pub user_request: UserRequest,
    #[serde(default)]
    pub configuration: TransformConfiguration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectContext {
    pub output_route: String,
    pub output_token: String,
    /// Presigned URL of the original object.
    #[serde(rename = "inputS3Url")]
    pub input_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserRequest {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfiguration {
    /// Bucket (or access point) whose tags govern access.
    #[serde(default)]
    pub supporting_access_point_arn: Option<String>,
}

impl TransformEvent {
    /// Object key the reader asked for.
    pub fn object_key(&self) -> String {
        object_key_from_url(&self.user_request.url)
    }
}

/// Extract an object key from the reader's request URL.
///
/// Absolute `http(s)` URLs contribute their path; anything else is treated
/// as a path with a single leading character (the `/`) dropped. Query
/// strings are removed in both cases.
pub fn object_key_from_url(url: &str) -> String {
    let key = match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            parsed.path().trim_start_matches('/').to_string()
        }
        _ => {
            let mut chars = url.chars();
            chars.next();
            chars.as_str().to_string()
        }
    };
    match key.split_once('?') {
        Some((path, _)) => path.to_string(),
        None => key,
    }
}

/// What a transform handler writes back to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectResponse {
    pub request_route: String,
    pub request_token: String,
    pub status: u16,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl ObjectResponse {
    pub fn ok(ctx: &GetObjectContext, body: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            request_route: ctx.output_route.clone(),
            request_token: ctx.output_token.clone(),
            status: 200,
            body: Some(body),
            content_type: content_type.map(str::to_string),
            error_code: None,
            error_message: None,
        }
    }

    pub fn error(ctx: &GetObjectContext, status: u16, code: &str, message: &str) -> Self {
        Self {
            request_route: ctx.output_route.clone(),
            request_token: ctx.output_token.clone(),
            status,
            body: None,
            content_type: None,
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
