// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::CollectorError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ENDPOINT: &str = "http://minio:9000";
// Local development credentials only.
const DEFAULT_ACCESS_KEY: &str = "minioadmin";
const DEFAULT_SECRET_KEY: &str = "minioadmin123";
const DEFAULT_BUCKET: &str = "logs";
const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BUFFER_THRESHOLD: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 1024 * 1024;
const DEFAULT_MAX_GENERATED_LOGS: usize = 10_000;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Connection settings for the S3-compatible object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    /// Endpoint URL, always carrying a scheme (e.g. `http://minio:9000`)
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Bucket receiving the batch objects
    pub bucket: String,
    /// Region used for request signing
    pub region: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// Configuration for the log collector
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP intake binds to
    pub host: String,
    /// Port the HTTP intake listens on
    pub port: u16,
    pub object_store: ObjectStoreConfig,
    /// Number of buffered records that triggers an immediate flush
    pub buffer_threshold: usize,
    /// how often to flush the buffer, in milliseconds
    pub flush_interval_ms: u64,
    pub max_request_content_length: usize,
    /// Upper bound for a single test-log generation request
    pub max_generated_logs: usize,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            object_store: ObjectStoreConfig::default(),
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            max_generated_logs: DEFAULT_MAX_GENERATED_LOGS,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, CollectorError> {
        let endpoint = env::var("MINIO_ENDPOINT")
            .map(|val| normalize_endpoint(&val))
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let object_store = ObjectStoreConfig {
            endpoint,
            access_key: env::var("MINIO_ACCESS_KEY")
                .unwrap_or_else(|_| DEFAULT_ACCESS_KEY.to_string()),
            secret_key: env::var("MINIO_SECRET_KEY")
                .unwrap_or_else(|_| DEFAULT_SECRET_KEY.to_string()),
            bucket: env::var("LOG_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            region: env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_env("PORT").unwrap_or(DEFAULT_PORT),
            object_store,
            buffer_threshold: parse_env("LOG_BUFFER_SIZE").unwrap_or(DEFAULT_BUFFER_THRESHOLD),
            flush_interval_ms: parse_env("LOG_FLUSH_INTERVAL_MS")
                .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
            max_request_content_length: parse_env("MAX_REQUEST_CONTENT_LENGTH")
                .unwrap_or(DEFAULT_MAX_REQUEST_CONTENT_LENGTH),
            max_generated_logs: parse_env("MAX_GENERATED_LOGS")
                .unwrap_or(DEFAULT_MAX_GENERATED_LOGS),
            log_level: env::var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.port == 0 {
            return Err(CollectorError::InvalidConfig(
                "PORT must be greater than 0".to_string(),
            ));
        }

        if self.buffer_threshold == 0 {
            return Err(CollectorError::InvalidConfig(
                "LOG_BUFFER_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.flush_interval_ms == 0 {
            return Err(CollectorError::InvalidConfig(
                "LOG_FLUSH_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        if self.object_store.bucket.trim().is_empty() {
            return Err(CollectorError::InvalidConfig(
                "LOG_BUCKET cannot be empty".to_string(),
            ));
        }

        if self.object_store.endpoint.trim().is_empty() {
            return Err(CollectorError::InvalidConfig(
                "MINIO_ENDPOINT cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CollectorError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

/// Prefixes `http://` when the endpoint has no scheme, so `minio:9000` and
/// `http://minio:9000` are equivalent.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() || endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
