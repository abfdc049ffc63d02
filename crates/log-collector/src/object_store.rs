// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serialization of flushed records and their upload to an S3-compatible
//! object store.

use async_trait::async_trait;
use chrono::Utc;
use opendal::{services, Operator};
use tracing::debug;
use uuid::Uuid;

use crate::config::ObjectStoreConfig;
use crate::error::CollectorError;
use crate::log_record::LogRecord;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// One snapshot of the buffer, named and serialized for a single upload.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    object_name: String,
    records: Vec<LogRecord>,
    payload: Vec<u8>,
}

impl FlushBatch {
    /// Names the batch `logs_<epochMillis>_<uuid>.json` and serializes the
    /// records as a pretty-printed JSON array.
    pub fn new(records: Vec<LogRecord>) -> Result<Self, CollectorError> {
        let payload = serde_json::to_vec_pretty(&records)?;
        Ok(Self {
            object_name: object_name(Utc::now().timestamp_millis(), Uuid::new_v4()),
            records,
            payload,
        })
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn content_length(&self) -> usize {
        self.payload.len()
    }
}

pub fn object_name(epoch_millis: i64, id: Uuid) -> String {
    format!("logs_{epoch_millis}_{id}.json")
}

#[async_trait]
pub trait BatchWriter {
    /// Durably writes one batch. An error means the batch was not stored.
    async fn write_batch(&self, batch: &FlushBatch) -> Result<(), CollectorError>;
}

/// Writes batches as objects into a single bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreWriter {
    operator: Operator,
    bucket: String,
}

impl ObjectStoreWriter {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self, CollectorError> {
        let builder = services::S3::default()
            .root("/")
            .bucket(&config.bucket)
            .endpoint(&config.endpoint)
            .region(&config.region)
            .access_key_id(&config.access_key)
            .secret_access_key(&config.secret_key)
            .disable_config_load()
            .disable_ec2_metadata();

        let operator = Operator::new(builder)
            .map_err(|e| CollectorError::InvalidConfig(format!("object store: {e}")))?
            .finish();

        Ok(Self {
            operator,
            bucket: config.bucket.clone(),
        })
    }

    /// Wraps an already configured operator, e.g. an in-memory one.
    pub fn from_operator(operator: Operator, bucket: impl Into<String>) -> Self {
        Self {
            operator,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BatchWriter for ObjectStoreWriter {
    async fn write_batch(&self, batch: &FlushBatch) -> Result<(), CollectorError> {
        debug!(
            "Uploading {} ({} records, {} bytes) to bucket {}",
            batch.object_name(),
            batch.len(),
            batch.content_length(),
            self.bucket
        );

        self.operator
            .write_with(batch.object_name(), batch.payload().to_vec())
            .content_type(CONTENT_TYPE_JSON)
            .await
            .map_err(classify_error)?;

        Ok(())
    }
}

fn classify_error(err: opendal::Error) -> CollectorError {
    if err.is_temporary() {
        CollectorError::StoreUnavailable(err.to_string())
    } else {
        CollectorError::UploadFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_record::{build_log_record, LogOptions};
    use mockito::{Matcher, Server};

    fn records(n: usize) -> Vec<LogRecord> {
        (0..n)
            .map(|_| build_log_record(Some("page_view"), LogOptions::default()).unwrap())
            .collect()
    }

    fn store_config(endpoint: String) -> ObjectStoreConfig {
        ObjectStoreConfig {
            endpoint,
            ..Default::default()
        }
    }

    #[test]
    fn test_object_name_format() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            object_name(1_700_000_000_123, id),
            "logs_1700000000123_67e55044-10b1-426f-9247-bb680e5fe0c8.json"
        );
    }

    #[test]
    fn test_batch_payload_is_pretty_json_array() {
        let batch = FlushBatch::new(records(3)).unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batch.object_name().starts_with("logs_"));
        assert!(batch.object_name().ends_with(".json"));
        assert_eq!(batch.content_length(), batch.payload().len());

        let text = std::str::from_utf8(batch.payload()).unwrap();
        assert!(text.starts_with("[\n  {"));
        let decoded: Vec<LogRecord> = serde_json::from_str(text).unwrap();
        assert_eq!(decoded, batch.records());
    }

    #[test]
    fn test_batch_names_are_unique() {
        let a = FlushBatch::new(records(1)).unwrap();
        let b = FlushBatch::new(records(1)).unwrap();
        assert_ne!(a.object_name(), b.object_name());
    }

    #[tokio::test]
    async fn test_memory_store_receives_payload() {
        let operator = Operator::new(services::Memory::default()).unwrap().finish();
        let writer = ObjectStoreWriter::from_operator(operator.clone(), "logs");
        let batch = FlushBatch::new(records(2)).unwrap();

        writer.write_batch(&batch).await.unwrap();

        let stored = operator.read(batch.object_name()).await.unwrap().to_vec();
        assert_eq!(stored, batch.payload());
    }

    #[tokio::test]
    async fn test_s3_upload_puts_json_object_into_bucket() {
        let mut server = Server::new_async().await;
        let batch = FlushBatch::new(records(5)).unwrap();
        let mock = server
            .mock(
                "PUT",
                Matcher::Regex(r"^/logs/logs_\d+_[0-9a-f-]{36}\.json$".to_string()),
            )
            .match_header("content-type", "application/json")
            .match_header("content-length", batch.content_length().to_string().as_str())
            .with_status(200)
            .create_async()
            .await;

        let writer = ObjectStoreWriter::new(&store_config(server.url())).unwrap();

        writer.write_batch(&batch).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_s3_rejection_is_upload_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", Matcher::Any)
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code><Message>denied</Message></Error>")
            .create_async()
            .await;

        let writer = ObjectStoreWriter::new(&store_config(server.url())).unwrap();
        let batch = FlushBatch::new(records(1)).unwrap();

        let err = writer.write_batch(&batch).await.unwrap_err();
        assert!(matches!(err, CollectorError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn test_s3_server_error_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let writer = ObjectStoreWriter::new(&store_config(server.url())).unwrap();
        let batch = FlushBatch::new(records(1)).unwrap();

        let err = writer.write_batch(&batch).await.unwrap_err();
        assert!(err.is_flush_error());
    }
}
