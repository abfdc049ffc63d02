// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical log record and the builder that fills in defaults for missing
//! request fields.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CollectorError;

pub const DEFAULT_USER_AGENT: &str = "unknown";
pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PAGE: &str = "/";

/// Exclusive upper bound of the placeholder duration assigned when the
/// client does not report one.
pub const MAX_PLACEHOLDER_DURATION_MS: u64 = 5_000;

/// A single client event. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    timestamp: String,
    session_id: String,
    action: String,
    user_agent: String,
    ip: String,
    page: String,
    duration: u64,
    metadata: Map<String, Value>,
}

impl LogRecord {
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Optional fields accepted alongside the action.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub page: Option<String>,
    pub duration: Option<u64>,
    pub metadata: Option<Map<String, Value>>,
}

/// Builds a [`LogRecord`] stamped with the current time.
///
/// Empty strings count as absent and get the documented default. A missing
/// session id is replaced by a fresh UUIDv4, a missing duration by a random
/// value in `[0, 5000)`.
pub fn build_log_record(
    action: Option<&str>,
    options: LogOptions,
) -> Result<LogRecord, CollectorError> {
    let action = match action {
        Some(action) if !action.trim().is_empty() => action.to_string(),
        _ => {
            return Err(CollectorError::InvalidInput(
                "action is required".to_string(),
            ))
        }
    };

    Ok(LogRecord {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        session_id: non_empty(options.session_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        action,
        user_agent: non_empty(options.user_agent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        ip: non_empty(options.ip).unwrap_or_else(|| DEFAULT_IP.to_string()),
        page: non_empty(options.page).unwrap_or_else(|| DEFAULT_PAGE.to_string()),
        duration: options
            .duration
            .unwrap_or_else(|| fastrand::u64(..MAX_PLACEHOLDER_DURATION_MS)),
        metadata: options.metadata.unwrap_or_default(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
