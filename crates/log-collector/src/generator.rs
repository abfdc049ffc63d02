// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CollectorError;
use crate::log_record::{build_log_record, LogOptions, LogRecord};

pub const DEFAULT_TEST_LOG_COUNT: usize = 100;

pub const TEST_ACTIONS: [&str; 7] = [
    "page_view",
    "button_click",
    "form_submit",
    "scroll",
    "hover",
    "search",
    "download",
];

pub const TEST_PAGES: [&str; 6] = ["/", "/products", "/about", "/contact", "/cart", "/checkout"];

/// Synthesizes `count` records tagged `testData: true` that share one
/// `batchId` (the caller's, or a generated one).
pub fn generate_test_logs(
    count: usize,
    batch_id: Option<String>,
) -> Result<Vec<LogRecord>, CollectorError> {
    let batch_id = batch_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut metadata = Map::new();
    metadata.insert("testData".to_string(), Value::Bool(true));
    metadata.insert("batchId".to_string(), Value::String(batch_id));

    (0..count)
        .map(|_| {
            build_log_record(
                Some(pick(&TEST_ACTIONS)),
                LogOptions {
                    session_id: Some(Uuid::new_v4().to_string()),
                    page: Some(pick(&TEST_PAGES).to_string()),
                    metadata: Some(metadata.clone()),
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// Applies the default to a missing or zero count and enforces `max`.
pub fn resolve_count(requested: Option<usize>, max: usize) -> Result<usize, CollectorError> {
    let count = match requested {
        None | Some(0) => DEFAULT_TEST_LOG_COUNT,
        Some(count) => count,
    };
    if count > max {
        return Err(CollectorError::InvalidInput(format!(
            "count must not exceed {max}"
        )));
    }
    Ok(count)
}

fn pick<'a>(values: &[&'a str]) -> &'a str {
    values[fastrand::usize(..values.len())]
}
