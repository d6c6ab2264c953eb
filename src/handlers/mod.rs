//! Event handlers wiring the scanner, storage and metrics together.
//!
//! A [`Pipeline`] holds one of each external seam and exposes one async
//! method per trigger:
//!
//! - [`Pipeline::handle_object_created`] (storage event → chunked upload + scan)
//! - [`Pipeline::handle_storage_callback`] (webhook → tag flagged objects)
//! - [`Pipeline::handle_host_callback`] (webhook → count host detections)
//! - [`Pipeline::restrict`] (object read → block tagged objects)
//! - [`Pipeline::filter`] (object read → redacted text)
//!
//! Handlers are stateless between invocations; everything persistent goes
//! through the [`ObjectStore`], [`CorrelationStore`] and [`MetricsSink`].

pub mod events;
pub mod filter;
pub mod flag;
pub mod monitor;
pub mod restrict;
pub mod upload;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{DlpGateError, Result};
use crate::metrics::{self, Metric, MetricsSink, SqliteMetrics};
use crate::objects::{HttpObjectSource, LocalObjectStore, ObjectSource, ObjectStore};
use crate::scan::{NightfallClient, Scanner};
use crate::store::{self, CorrelationStore, DbPool};
use crate::webhook::SignatureVerifier;

pub use events::{ObjectResponse, StorageEvent, TransformEvent};

/// Reply to a webhook callback that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    /// Echo this challenge back as plain text.
    Challenge(String),
    /// Notification processed.
    Received,
}

/// Non-secret settings the handlers read on every invocation.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub policy_uuid: Option<String>,
    pub detection_rules: Vec<String>,
    pub namespace: String,
    pub instance_name: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy_uuid: config.nightfall.policy_uuid.clone(),
            detection_rules: config.nightfall.detection_rules.clone(),
            namespace: config.metrics.namespace.clone(),
            instance_name: config.metrics.instance_name.clone(),
        }
    }
}

/// The external services every handler works against.
pub struct Pipeline {
    pub scanner: Arc<dyn Scanner>,
    pub objects: Arc<dyn ObjectStore>,
    pub source: Arc<dyn ObjectSource>,
    pub metrics: Arc<dyn MetricsSink>,
    pub uploads: CorrelationStore,
    pub verifier: SignatureVerifier,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Build the production pipeline: Nightfall scanner, local object store
    /// and SQLite-backed correlation table and metrics.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = open_database(config)?;
        Self::with_pool(config, pool)
    }

    /// Same as [`Pipeline::from_config`], sharing an already open database.
    pub fn with_pool(config: &AppConfig, pool: DbPool) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.root)?;
        Ok(Self {
            scanner: Arc::new(NightfallClient::from_config(&config.nightfall)),
            objects: Arc::new(LocalObjectStore::new(&config.storage.root, pool.clone())),
            source: Arc::new(HttpObjectSource::default()),
            metrics: Arc::new(SqliteMetrics::new(pool.clone())),
            uploads: CorrelationStore::new(pool, &config.storage.correlation_table)?,
            verifier: SignatureVerifier::new(&config.nightfall.signing_secret)
                .with_max_skew(config.webhook.max_timestamp_skew_secs),
            settings: PipelineSettings::from_config(config),
        })
    }

    /// Emit a count of one under the configured namespace.
    fn count(&self, name: &str, dimension_name: &str, dimension_value: &str) {
        metrics::emit(
            self.metrics.as_ref(),
            Metric::count(&self.settings.namespace, name, dimension_name, dimension_value),
        );
    }

    fn policy_uuid(&self) -> Result<&str> {
        self.settings
            .policy_uuid
            .as_deref()
            .ok_or_else(|| DlpGateError::Config("nightfall.policy_uuid is not set".to_string()))
    }
}

/// Open the configured database file, creating its directory first.
pub fn open_database(config: &AppConfig) -> Result<DbPool> {
    if let Some(parent) = config.storage.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    store::open_pool(&config.storage.database)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process doubles for the pipeline's external seams.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::DlpGateError;
    use crate::scan::{FileScan, TextScanRequest, TextScanResult};
    use crate::store::open_memory_pool;

    pub const SECRET: &str = "test-secret";

    /// Scanner that records what it was asked and answers from canned data.
    #[derive(Default)]
    pub struct MockScanner {
        pub files: Mutex<Vec<(Vec<u8>, String)>>,
        pub texts: Mutex<Vec<(Vec<String>, TextScanRequest)>>,
        pub redacted: Option<String>,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl Scanner for MockScanner {
        async fn scan_file(&self, data: &[u8], policy_uuid: &str) -> Result<FileScan> {
            if self.fail {
                return Err(DlpGateError::ScanApi {
                    stage: "upload init",
                    status: 500,
                });
            }
            let mut files = self.files.lock().unwrap();
            files.push((data.to_vec(), policy_uuid.to_string()));
            Ok(FileScan {
                id: format!("scan-{}", files.len()),
                message: None,
            })
        }

        async fn scan_text(
            &self,
            texts: &[String],
            request: &TextScanRequest,
        ) -> Result<TextScanResult> {
            if self.fail {
                return Err(DlpGateError::ScanApi {
                    stage: "text scan",
                    status: 500,
                });
            }
            self.texts
                .lock()
                .unwrap()
                .push((texts.to_vec(), request.clone()));
            Ok(TextScanResult {
                findings: vec![Vec::new(); texts.len()],
                redacted: texts.iter().map(|_| self.redacted.clone()).collect(),
            })
        }
    }

    /// Object source serving fixed bodies by URL.
    #[derive(Default)]
    pub struct StaticSource {
        pub bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl ObjectSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| DlpGateError::Server(format!("no body for {}", url)))
        }
    }

    /// Metrics sink that keeps data points in memory.
    #[derive(Default)]
    pub struct MemoryMetrics {
        pub points: Mutex<Vec<Metric>>,
    }

    impl MemoryMetrics {
        pub fn names(&self) -> Vec<String> {
            self.points
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.name.clone())
                .collect()
        }
    }

    impl MetricsSink for MemoryMetrics {
        fn put_metric(&self, metric: &Metric) -> Result<()> {
            self.points.lock().unwrap().push(metric.clone());
            Ok(())
        }
    }

    pub struct Harness {
        pub pipeline: Arc<Pipeline>,
        pub store: LocalObjectStore,
        pub scanner: Arc<MockScanner>,
        pub metrics: Arc<MemoryMetrics>,
        pub _dir: tempfile::TempDir,
    }

    pub fn harness(scanner: MockScanner, source: StaticSource) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_memory_pool().unwrap();
        let store = LocalObjectStore::new(dir.path(), pool.clone());
        let scanner = Arc::new(scanner);
        let metrics = Arc::new(MemoryMetrics::default());
        let pipeline = Pipeline {
            scanner: scanner.clone(),
            objects: Arc::new(store.clone()),
            source: Arc::new(source),
            metrics: metrics.clone(),
            uploads: CorrelationStore::new(pool, "uploads").unwrap(),
            verifier: SignatureVerifier::new(SECRET),
            settings: PipelineSettings {
                policy_uuid: Some("policy-1".to_string()),
                detection_rules: vec!["rule-1".to_string()],
                namespace: "DLP".to_string(),
                instance_name: "Public VM".to_string(),
            },
        };
        Harness {
            pipeline: Arc::new(pipeline),
            store,
            scanner,
            metrics,
            _dir: dir,
        }
    }
}
