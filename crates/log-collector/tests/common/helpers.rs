// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use log_collector::{
    buffer::LogBuffer, config::Config, flusher::LogFlusher, intake::LogIntake,
    object_store::BatchWriter,
};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

pub struct TestCollector {
    pub addr: SocketAddr,
    pub flusher: Arc<LogFlusher>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

/// Start an intake on a random local port backed by the given writer
pub async fn start_collector(
    writer: Arc<dyn BatchWriter + Send + Sync>,
    threshold: usize,
) -> TestCollector {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind intake listener");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let config = Arc::new(Config {
        buffer_threshold: threshold,
        ..Default::default()
    });
    let flusher = Arc::new(LogFlusher::new(
        Arc::new(LogBuffer::new()),
        writer,
        threshold,
    ));
    let cancel = CancellationToken::new();

    let intake = LogIntake::new(config, Arc::clone(&flusher));
    let serve_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        intake
            .serve(listener, serve_cancel)
            .await
            .expect("intake stopped with an error");
    });

    TestCollector {
        addr,
        flusher,
        cancel,
        handle,
    }
}

/// Send a JSON POST over TCP and return the status and decoded body
pub async fn post_json(
    addr: SocketAddr,
    uri: &str,
    body: &str,
) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method("POST")
        .header("Host", addr.to_string())
        .header("Content-Type", "application/json")
        .header("Content-Length", body.len().to_string())
        .header("User-Agent", "integration-test")
        .body(Full::new(Bytes::from(body.to_string())))?;

    let response = timeout(Duration::from_secs(5), sender.send_request(request)).await??;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = serde_json::from_slice(&bytes)?;
    Ok((status, value))
}

/// Poll `condition` until it holds or the deadline passes
pub async fn wait_until<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let poll = async {
        while !condition().await {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(deadline, poll).await.is_ok()
}
