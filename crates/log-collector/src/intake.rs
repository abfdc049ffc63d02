// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::CollectorError;
use crate::flusher::LogFlusher;
use crate::generator::{generate_test_logs, resolve_count};
use crate::http_utils::{
    client_ip, json_response, log_and_create_http_response, preflight_response, user_agent,
    verify_request_content_length, HttpResponse,
};
use crate::log_record::{build_log_record, LogOptions};

pub const LOG_ENDPOINT_PATH: &str = "/api/log";
pub const GENERATE_ENDPOINT_PATH: &str = "/api/generate-test-logs";
pub const INFO_ENDPOINT_PATH: &str = "/api/info";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRequest {
    action: Option<String>,
    session_id: Option<String>,
    page: Option<String>,
    duration: Option<u64>,
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    count: Option<usize>,
    batch_id: Option<String>,
}

/// HTTP front end that turns requests into buffered log records.
pub struct LogIntake {
    pub config: Arc<Config>,
    pub flusher: Arc<LogFlusher>,
}

impl LogIntake {
    pub fn new(config: Arc<Config>, flusher: Arc<LogFlusher>) -> Self {
        LogIntake { config, flusher }
    }

    /// Binds the configured address and serves until `cancel` fires.
    pub async fn start_intake(
        &self,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Log collector listening on {addr}");
        self.serve(listener, cancel).await
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let (conn, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Intake shutting down, {} connections open", joinset.len());
                    break;
                }
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let config = Arc::clone(&self.config);
            let flusher = Arc::clone(&self.flusher);
            let service = service_fn(move |req: Request<Incoming>| {
                LogIntake::endpoint_handler(
                    Arc::clone(&config),
                    Arc::clone(&flusher),
                    req,
                    Some(peer),
                )
            });

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }

        joinset.shutdown().await;
        Ok(())
    }

    pub async fn endpoint_handler<B>(
        config: Arc<Config>,
        flusher: Arc<LogFlusher>,
        req: Request<B>,
        peer: Option<SocketAddr>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        match (req.method(), req.uri().path()) {
            (&Method::OPTIONS, _) => preflight_response(),
            (&Method::POST, LOG_ENDPOINT_PATH) => {
                Self::log_handler(&config, flusher, req, peer).await
            }
            (&Method::POST, GENERATE_ENDPOINT_PATH) => {
                Self::generate_handler(&config, &flusher, req).await
            }
            (&Method::GET, INFO_ENDPOINT_PATH) => Self::info_handler(&config, &flusher),
            _ => json_response(
                StatusCode::NOT_FOUND,
                &json!({ "success": false, "message": "Not found" }),
            ),
        }
    }

    async fn log_handler<B>(
        config: &Config,
        flusher: Arc<LogFlusher>,
        req: Request<B>,
        peer: Option<SocketAddr>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            config.max_request_content_length,
            "Error processing log",
        ) {
            return response;
        }

        let request: LogRequest = match read_json(body).await {
            Ok(request) => request,
            Err(e) => return error_response(&e),
        };

        let record = match build_log_record(
            request.action.as_deref(),
            LogOptions {
                session_id: request.session_id,
                user_agent: user_agent(&parts.headers),
                ip: client_ip(&parts.headers, peer),
                page: request.page,
                duration: request.duration,
                metadata: request.metadata,
            },
        ) {
            Ok(record) => record,
            Err(e) => return error_response(&e),
        };

        debug!("Log received: {}", record.action());
        let log_id = record.timestamp().to_string();
        let buffered = flusher.buffer().append(record);

        // Upload happens off the request path; failures are only logged.
        if buffered >= flusher.threshold() {
            flusher.spawn_maybe_flush();
        }

        json_response(StatusCode::OK, &json!({ "success": true, "logId": log_id }))
    }

    async fn generate_handler<B>(
        config: &Config,
        flusher: &LogFlusher,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            config.max_request_content_length,
            "Error generating test logs",
        ) {
            return response;
        }

        let request: GenerateRequest = match read_json(body).await {
            Ok(request) => request,
            Err(e) => return error_response(&e),
        };

        let logs = match resolve_count(request.count, config.max_generated_logs)
            .and_then(|count| generate_test_logs(count, request.batch_id))
        {
            Ok(logs) => logs,
            Err(e) => return error_response(&e),
        };
        let count = logs.len();
        flusher.buffer().extend(logs);

        // Generated batches are always persisted before answering.
        flusher.flush_now().await;

        json_response(
            StatusCode::OK,
            &json!({ "success": true, "message": format!("Generated {count} test logs") }),
        )
    }

    fn info_handler(config: &Config, flusher: &LogFlusher) -> http::Result<HttpResponse> {
        let response_json = json!(
            {
                "endpoints": [
                    LOG_ENDPOINT_PATH,
                    GENERATE_ENDPOINT_PATH,
                    INFO_ENDPOINT_PATH
                ],
                "buffered_logs": flusher.buffer().size(),
                "config": {
                    "buffer_threshold": flusher.threshold(),
                    "flush_interval_ms": config.flush_interval_ms,
                    "bucket": config.object_store.bucket,
                }
            }
        );
        json_response(StatusCode::OK, &response_json)
    }
}

/// Collects the body and decodes it as JSON; an empty body decodes as `{}`.
async fn read_json<T, B>(body: B) -> Result<T, CollectorError>
where
    T: DeserializeOwned + Default,
    B: Body,
    B::Error: Display,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| CollectorError::InvalidInput(format!("Error reading request body: {e}")))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| CollectorError::InvalidInput(format!("Malformed JSON body: {e}")))
}

fn error_response(err: &CollectorError) -> http::Result<HttpResponse> {
    let status = match err {
        CollectorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log_and_create_http_response(&err.to_string(), status)
}
