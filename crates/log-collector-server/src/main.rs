// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_collector::{
    buffer::LogBuffer, config::Config, flusher::LogFlusher, intake::LogIntake,
    object_store::ObjectStoreWriter,
};

#[tokio::main]
pub async fn main() {
    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Error creating log collector config: {e}");
            return;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return;
    }

    debug!("Logging subsystem enabled");

    let writer = match ObjectStoreWriter::new(&config.object_store) {
        Ok(writer) => Arc::new(writer),
        Err(e) => {
            error!("Error creating object store writer: {e}");
            return;
        }
    };
    info!(
        "Object store endpoint: {}, bucket: {}",
        config.object_store.endpoint,
        writer.bucket()
    );

    let buffer = Arc::new(LogBuffer::new());
    let flusher = Arc::new(LogFlusher::new(buffer, writer, config.buffer_threshold));
    let flush_cancel = CancellationToken::new();
    let intake_cancel = CancellationToken::new();

    let flush_handle = flusher.spawn_periodic_flush(config.flush_interval(), flush_cancel.clone());

    let intake = LogIntake::new(Arc::clone(&config), Arc::clone(&flusher));
    let serve_cancel = intake_cancel.clone();
    let mut intake_handle = tokio::spawn(async move {
        if let Err(e) = intake.start_intake(serve_cancel).await {
            error!("Error when starting log collector intake: {e:?}");
        }
    });

    let intake_exited = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutting down log collector");
            false
        }
        res = &mut intake_handle => {
            if let Err(e) = res {
                error!("Intake task failed: {e}");
            }
            true
        }
    };

    // Stop accepting records before the final drain so none are left behind.
    intake_cancel.cancel();
    if !intake_exited {
        if let Err(e) = intake_handle.await {
            error!("Intake task failed: {e}");
        }
    }
    flush_cancel.cancel();
    if let Err(e) = flush_handle.await {
        error!("Flush task failed: {e}");
    }
}
