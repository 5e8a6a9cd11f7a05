// Error types callers need to match on

use thiserror::Error;

/// Failure of a backend write or of the store on top of it
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would push the backend past its byte quota
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, {quota} bytes allowed")]
    QuotaExceeded { key: String, needed: u64, quota: u64 },

    #[error("failed to serialize {key}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage I/O error on {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error on {key}")]
    Database {
        key: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Why an import document was rejected
///
/// Every variant except `Storage` is produced before anything is written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid backup file format: missing version field")]
    MissingVersion,

    #[error("invalid backup file format: {field} must be {expected}")]
    WrongType { field: &'static str, expected: &'static str },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_message_names_key() {
        let err = StoreError::QuotaExceeded {
            key: "psk_files".to_string(),
            needed: 10,
            quota: 5,
        };
        assert!(err.is_quota());
        assert!(err.to_string().contains("psk_files"));
    }

    #[test]
    fn test_missing_version_message() {
        assert_eq!(
            ImportError::MissingVersion.to_string(),
            "invalid backup file format: missing version field"
        );
    }
}
