use tracing::{error, info};

use super::{Pipeline, StorageEvent};
use crate::error::Result;
use crate::metrics::TIMES_SCANNED;
use crate::objects::{TagSet, NIGHTFALL_ID_TAG};
use crate::scan::FileScan;
use crate::store::CorrelationRecord;

impl Pipeline {
    /// Handle a storage-creation event.
    ///
    /// Every record is processed in order; the first failure aborts the rest.
    pub async fn handle_object_created(&self, event: &StorageEvent) -> Result<Vec<FileScan>> {
        let mut scans = Vec::with_capacity(event.records.len());
        for record in &event.records {
            let bucket = &record.s3.bucket.name;
            let key = &record.s3.object.key;
            match self.scan_object(bucket, key).await {
                Ok(scan) => scans.push(scan),
                Err(e) => {
                    error!(event = "file_upload", file = %key, "Failed to scan {}/{}: {}", bucket, key, e);
                    return Err(e);
                }
            }
        }
        Ok(scans)
    }

    /// Submit one stored object for scanning and remember where it came from.
    pub async fn scan_object(&self, bucket: &str, key: &str) -> Result<FileScan> {
        let policy_uuid = self.policy_uuid()?;
        let data = self.objects.get_object(bucket, key).await?;

        let scan = self.scanner.scan_file(&data, policy_uuid).await?;

        self.objects
            .put_tags(bucket, key, &TagSet::from_pairs([(NIGHTFALL_ID_TAG, scan.id.as_str())]))
            .await?;
        self.uploads.put(&CorrelationRecord {
            upload_id: scan.id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        self.count(TIMES_SCANNED, "Bucket", bucket);

        info!(
            event = "file_upload",
            file = %key,
            id = %scan.id,
            "File {} queued for scanning with id {}",
            key,
            scan.id
        );
        Ok(scan)
    }
}
