//! HTTP front end for the pipeline.
//!
//! Every trigger the handlers understand is exposed as a route; the server
//! binds to `127.0.0.1:8080` by default:
//!
//! - `POST /events/object-created` (storage notification)
//! - `POST /webhooks/storage` (scan callback for stored objects)
//! - `POST /webhooks/host` (scan callback for host files)
//! - `POST /transform/restrict` (tag-gated object read)
//! - `POST /transform/filter` (redacted object read)
//! - `GET  /api/metrics` (metric totals)
//! - `GET  /api/metrics/recent` (latest data points)

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::AppConfig;
use crate::error::{DlpGateError, Result};
use crate::handlers::{self, ObjectResponse, Pipeline, StorageEvent, TransformEvent, WebhookReply};
use crate::metrics::{self, MetricRecord};
use crate::store::DbPool;

pub const REQUEST_ROUTE_HEADER: &str = "x-request-route";
pub const REQUEST_TOKEN_HEADER: &str = "x-request-token";
pub const ERROR_CODE_HEADER: &str = "x-error-code";
pub const ERROR_MESSAGE_HEADER: &str = "x-error-message";

/// Shared application state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Database holding the metrics table; `None` disables `/api/metrics`.
    pub db: Option<DbPool>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = handlers::open_database(config)?;
        Ok(Self {
            pipeline: Arc::new(Pipeline::with_pool(config, pool.clone())?),
            db: Some(pool),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/events/object-created", post(object_created))
        .route("/webhooks/storage", post(storage_webhook))
        .route("/webhooks/host", post(host_webhook))
        .route("/transform/restrict", post(restrict))
        .route("/transform/filter", post(filter))
        .route("/api/metrics", get(get_metric_totals))
        .route("/api/metrics/recent", get(get_recent_metrics))
        .with_state(state)
}

/// Start the HTTP server on the given address.
pub async fn start(listen_addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("dlpgate listening on {}", listen_addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| DlpGateError::Server(e.to_string()))?;
    Ok(())
}

// ─── Query Parameters ───────────────────────────────────────────────────────

/// Query parameters for `GET /api/metrics/recent`.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// Maximum number of data points to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

// ─── Response Types ─────────────────────────────────────────────────────────

/// Answer to a processed storage event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_ids: Vec<String>,
}

/// A stored data point as returned by the API.
#[derive(Debug, Serialize)]
pub struct MetricEntryResponse {
    pub id: i64,
    pub timestamp: String,
    pub name: String,
    pub dimension_name: String,
    pub dimension_value: String,
    pub value: f64,
}

impl From<MetricRecord> for MetricEntryResponse {
    fn from(r: MetricRecord) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
            name: r.metric.name,
            dimension_name: r.metric.dimension_name,
            dimension_value: r.metric.dimension_value,
            value: r.metric.value,
        }
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// `POST /events/object-created`: submit every created object for scanning.
async fn object_created(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let event: StorageEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected storage event: {}", e);
            return (StatusCode::BAD_REQUEST, "wrong payload").into_response();
        }
    };
    match state.pipeline.handle_object_created(&event).await {
        Ok(scans) => Json(UploadResponse {
            upload_ids: scans.into_iter().map(|s| s.id).collect(),
        })
        .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to process object").into_response(),
    }
}

/// `POST /webhooks/storage`: tag objects the scanner flagged.
async fn storage_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    webhook_response(state.pipeline.handle_storage_callback(&body, &headers).await)
}

/// `POST /webhooks/host`: count detections in host files.
async fn host_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    webhook_response(state.pipeline.handle_host_callback(&body, &headers).await)
}

/// `POST /transform/restrict`
async fn restrict(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match parse_transform(&body) {
        Ok(event) => object_response(state.pipeline.restrict(&event).await),
        Err(resp) => resp,
    }
}

/// `POST /transform/filter`
async fn filter(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match parse_transform(&body) {
        Ok(event) => object_response(state.pipeline.filter(&event).await),
        Err(resp) => resp,
    }
}

/// `GET /api/metrics`: totals per metric and dimension.
async fn get_metric_totals(State(state): State<Arc<AppState>>) -> Response {
    let conn = match db_conn(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    match metrics::query_totals(&conn) {
        Ok(totals) => Json(totals).into_response(),
        Err(e) => internal_json(e),
    }
}

/// `GET /api/metrics/recent`: latest data points, newest first.
async fn get_recent_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Response {
    let conn = match db_conn(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    match metrics::query_recent(&conn, params.limit) {
        Ok(records) => {
            let entries: Vec<MetricEntryResponse> =
                records.into_iter().map(MetricEntryResponse::from).collect();
            Json(entries).into_response()
        }
        Err(e) => internal_json(e),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn webhook_response(result: Result<WebhookReply>) -> Response {
    match result {
        Ok(WebhookReply::Challenge(challenge)) => {
            ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
        }
        Ok(WebhookReply::Received) => (StatusCode::OK, "payload received").into_response(),
        Err(e) => {
            let (status, message) = match &e {
                DlpGateError::MissingHeader(_) => (StatusCode::BAD_REQUEST, "missing headers"),
                DlpGateError::InvalidSignature | DlpGateError::StaleTimestamp => {
                    (StatusCode::UNAUTHORIZED, "invalid signature")
                }
                DlpGateError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "wrong payload"),
                _ => {
                    error!("Webhook processing failed: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "failed to process object")
                }
            };
            if status != StatusCode::INTERNAL_SERVER_ERROR {
                warn!("Rejected webhook: {}", e);
            }
            (status, message).into_response()
        }
    }
}

fn parse_transform(body: &[u8]) -> std::result::Result<TransformEvent, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected transform event: {}", e);
        (StatusCode::BAD_REQUEST, "wrong payload").into_response()
    })
}

/// Render an [`ObjectResponse`] with routing and error details as headers.
fn object_response(resp: ObjectResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(resp.body.unwrap_or_default()));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    let pairs = [
        (REQUEST_ROUTE_HEADER, Some(resp.request_route)),
        (REQUEST_TOKEN_HEADER, Some(resp.request_token)),
        (ERROR_CODE_HEADER, resp.error_code),
        (ERROR_MESSAGE_HEADER, resp.error_message),
        ("content-type", resp.content_type),
    ];
    for (name, value) in pairs {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => warn!("Dropping unrepresentable {} header", name),
        }
    }
    out
}

fn db_conn(
    state: &AppState,
) -> std::result::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, Response> {
    let Some(ref pool) = state.db else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "no database"})),
        )
            .into_response());
    };
    pool.get().map_err(|e| internal_json(e.into()))
}

fn internal_json(e: DlpGateError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::handlers::testing::{harness, Harness, MockScanner, StaticSource};
    use crate::metrics::{Metric, MetricsSink, SqliteMetrics, TIMES_SCANNED};
    use crate::objects::{ObjectStore, TagSet, SENSITIVE_DATA_TAG};
    use crate::store::open_memory_pool;
    use crate::webhook::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use axum::http::Request;
    use tower::ServiceExt as _;

    const INPUT: &str = "http://objects.local/doc.txt";

    fn app(scanner: MockScanner, source: StaticSource) -> (Router, Harness) {
        let h = harness(scanner, source);
        let state = Arc::new(AppState {
            pipeline: h.pipeline.clone(),
            db: None,
        });
        (router(state), h)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let resp = app.into_service().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn transform_body() -> String {
        serde_json::json!({
            "getObjectContext": {"outputRoute": "r-1", "outputToken": "t-1", "inputS3Url": INPUT},
            "userRequest": {"url": "/doc.txt"},
            "configuration": {"supportingAccessPointArn": "inbox"}
        })
        .to_string()
    }

    fn doc_source() -> StaticSource {
        StaticSource {
            bodies: HashMap::from([(INPUT.to_string(), b"hello".to_vec())]),
        }
    }

    #[tokio::test]
    async fn object_created_returns_upload_ids() {
        let (app, h) = app(MockScanner::default(), StaticSource::default());
        h.store.put_object("inbox", "doc.txt", b"hello").await.unwrap();

        let body = r#"{"Records":[{"s3":{"bucket":{"name":"inbox"},"object":{"key":"doc.txt"}}}]}"#;
        let (status, _, body) = send(app, post("/events/object-created", body)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["uploadIds"][0], "scan-1");
    }

    #[tokio::test]
    async fn object_created_failure_is_generic_500() {
        let (app, _h) = app(MockScanner::default(), StaticSource::default());
        let body = r#"{"Records":[{"s3":{"bucket":{"name":"inbox"},"object":{"key":"missing"}}}]}"#;
        let (status, _, body) = send(app, post("/events/object-created", body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"failed to process object");
    }

    #[tokio::test]
    async fn webhook_challenge_is_plain_text() {
        let (app, _h) = app(MockScanner::default(), StaticSource::default());
        let (status, headers, body) =
            send(app, post("/webhooks/storage", r#"{"challenge":"c-42"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body, b"c-42");
    }

    #[tokio::test]
    async fn webhook_error_statuses() {
        let payload = r#"{"uploadID":"u","findingsPresent":true}"#;

        let (app1, _h1) = app(MockScanner::default(), StaticSource::default());
        let (status, _, body) = send(app1, post("/webhooks/host", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"missing headers");

        let (app2, _h2) = app(MockScanner::default(), StaticSource::default());
        let mut req = post("/webhooks/host", payload);
        req.headers_mut()
            .insert(SIGNATURE_HEADER, HeaderValue::from_static("deadbeef"));
        req.headers_mut()
            .insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        let (status, _, body) = send(app2, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"invalid signature");

        let (app3, _h3) = app(MockScanner::default(), StaticSource::default());
        let (status, _, body) = send(app3, post("/webhooks/storage", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"wrong payload");
    }

    #[tokio::test]
    async fn signed_webhook_received() {
        let (app, h) = app(MockScanner::default(), StaticSource::default());
        let payload = r#"{"uploadID":"u","findingsPresent":false}"#;
        let sig = h.pipeline.verifier.sign("1700000000", payload);
        let mut req = post("/webhooks/storage", payload);
        req.headers_mut()
            .insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        req.headers_mut()
            .insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        let (status, _, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"payload received");
    }

    #[tokio::test]
    async fn restrict_passes_clean_object_with_routing_headers() {
        let (app, h) = app(MockScanner::default(), doc_source());
        h.store.put_object("inbox", "doc.txt", b"hello").await.unwrap();

        let (status, headers, body) = send(app, post("/transform/restrict", &transform_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[REQUEST_ROUTE_HEADER], "r-1");
        assert_eq!(headers[REQUEST_TOKEN_HEADER], "t-1");
        assert!(headers.get(ERROR_CODE_HEADER).is_none());
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn restrict_denies_sensitive_object() {
        let (app, h) = app(MockScanner::default(), doc_source());
        h.store.put_object("inbox", "doc.txt", b"hello").await.unwrap();
        h.store
            .put_tags("inbox", "doc.txt", &TagSet::from_pairs([(SENSITIVE_DATA_TAG, "True")]))
            .await
            .unwrap();

        let (status, headers, body) = send(app, post("/transform/restrict", &transform_body())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(headers[ERROR_CODE_HEADER], "AccessDenied");
        assert_eq!(headers[ERROR_MESSAGE_HEADER], "Access Denied");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn filter_sets_text_content_type() {
        let scanner = MockScanner {
            redacted: Some("*****".to_string()),
            ..Default::default()
        };
        let (app, h) = app(scanner, doc_source());
        h.store.put_object("inbox", "doc.txt", b"hello").await.unwrap();
        h.store
            .put_tags("inbox", "doc.txt", &TagSet::from_pairs([(SENSITIVE_DATA_TAG, "True")]))
            .await
            .unwrap();
        let (status, headers, body) = send(app, post("/transform/filter", &transform_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body, b"*****");
    }

    #[tokio::test]
    async fn malformed_transform_event_rejected() {
        let (app, _h) = app(MockScanner::default(), doc_source());
        let (status, _, _) = send(app, post("/transform/filter", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_totals() {
        let h = harness(MockScanner::default(), StaticSource::default());
        let pool = open_memory_pool().unwrap();
        let sink = SqliteMetrics::new(pool.clone());
        for bucket in ["inbox", "inbox", "archive"] {
            sink.put_metric(&Metric::count("DLP", TIMES_SCANNED, "Bucket", bucket))
                .unwrap();
        }
        let state = Arc::new(AppState {
            pipeline: h.pipeline.clone(),
            db: Some(pool),
        });

        let req = Request::builder()
            .uri("/api/metrics")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router(state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let totals = json.as_array().unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0]["dimension_value"], "archive");
        assert_eq!(totals[1]["dimension_value"], "inbox");
        assert_eq!(totals[1]["total"], 2.0);

        let req = Request::builder()
            .uri("/api/metrics/recent?limit=2")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(router(state), req).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["dimension_value"], "archive");
    }

    #[tokio::test]
    async fn metrics_without_database_is_503() {
        let (app, _h) = app(MockScanner::default(), StaticSource::default());
        let req = Request::builder()
            .uri("/api/metrics")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(app, req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
