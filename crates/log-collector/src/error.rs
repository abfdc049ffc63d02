// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors produced while ingesting, batching or persisting logs.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The request could not be turned into a log record.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The object store could not be reached or answered with a transient failure.
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    /// The object store rejected the upload.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CollectorError {
    /// True for errors raised on the flush path, where records are dropped.
    pub fn is_flush_error(&self) -> bool {
        matches!(
            self,
            CollectorError::StoreUnavailable(_)
                | CollectorError::UploadFailed(_)
                | CollectorError::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CollectorError::InvalidInput("action is required".to_string());
        assert_eq!(error.to_string(), "Invalid input: action is required");

        let error = CollectorError::StoreUnavailable("connection refused".to_string());
        assert_eq!(
            error.to_string(),
            "Object store unavailable: connection refused"
        );
    }

    #[test]
    fn test_flush_errors() {
        assert!(CollectorError::StoreUnavailable("x".into()).is_flush_error());
        assert!(CollectorError::UploadFailed("x".into()).is_flush_error());
        assert!(!CollectorError::InvalidInput("x".into()).is_flush_error());
        assert!(!CollectorError::InvalidConfig("x".into()).is_flush_error());
    }

    #[test]
    fn test_serialization_error_converts() {
        let Err(json_err) = serde_json::from_str::<serde_json::Value>("{not json") else {
            panic!("expected parse failure");
        };
        let error: CollectorError = json_err.into();
        assert!(matches!(error, CollectorError::Serialization(_)));
        assert!(error.is_flush_error());
    }
}
