use thiserror::Error;

/// Unified error type for the dlpgate library.
#[derive(Debug, Error)]
pub enum DlpGateError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Environment variable not set: {0}")]
    ConfigEnvVar(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The scanning API answered a step of a request with an unexpected status.
    #[error("Scan API {stage} failed with status {status}")]
    ScanApi { stage: &'static str, status: u16 },

    #[error("Scan API reported an unusable chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook timestamp outside accepted window")]
    StaleTimestamp,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, DlpGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DlpGateError = io_err.into();
        assert!(matches!(err, DlpGateError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn scan_api_error_names_stage_and_status() {
        let err = DlpGateError::ScanApi {
            stage: "chunk upload",
            status: 500,
        };
        assert_eq!(err.to_string(), "Scan API chunk upload failed with status 500");
    }

    #[test]
    fn config_parse_error_converts() {
        let toml_err = toml::from_str::<toml::Value>("[invalid").unwrap_err();
        let err: DlpGateError = toml_err.into();
        assert!(matches!(err, DlpGateError::ConfigParse(_)));
    }

    #[test]
    fn object_not_found_displays_location() {
        let err = DlpGateError::ObjectNotFound {
            bucket: "uploads".to_string(),
            key: "a/b.txt".to_string(),
        };
        assert_eq!(err.to_string(), "Object not found: uploads/a/b.txt");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DlpGateError>();
    }
}
