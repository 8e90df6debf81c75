/*
 * 5D Labs Agent Platform - Kubernetes Pod Executor
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Pod Executor Service - standalone watcher/launcher process.
//!
//! Drives an [`executor::ExecutorLoop`] on a fixed interval (standing in for
//! a scheduler's own polling cadence) and exposes `/healthz`/`/readyz` over
//! HTTP for cluster liveness/readiness probes.

use executor::health::ReadinessState;
use executor::{ExecutorConfig, ExecutorLoop, LoggingScheduler};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SYNC_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,executor=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pod executor v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let readiness = ReadinessState::new();

    let scheduler = Arc::new(LoggingScheduler);
    let mut executor = ExecutorLoop::start(config, scheduler, client).await?;
    readiness.mark_ready();

    let executor_handle = tokio::spawn({
        let readiness = readiness.clone();
        async move { run_sync_loop(&mut executor, &readiness).await }
    });

    let app = executor::health::router(readiness).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(Duration::from_secs(60))),
    );

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("Pod executor HTTP server listening on 0.0.0.0:8080");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    executor_handle.abort();
    info!("Pod executor stopped");

    Ok(())
}

/// Drives `sync()` forever on a fixed interval. In production this loop
/// belongs to the scheduler; standalone, a timer approximates its cadence.
async fn run_sync_loop(executor: &mut ExecutorLoop, readiness: &ReadinessState) {
    let mut interval = tokio::time::interval(SYNC_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(err) = executor.sync().await {
            warn!(error = %err, "sync tick failed");
            continue;
        }
        for (key, state) in executor.drain_event_buffer() {
            info!(key = %key, %state, "task finished");
        }
        if !readiness.is_ready() {
            readiness.mark_ready();
        }
    }
}

fn load_config() -> ExecutorConfig {
    let override_path = std::env::var("POD_EXECUTOR_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or("/config/config.yaml");

    match ExecutorConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("Loaded executor configuration from {}", config_path);
            cfg
        }
        Err(err) => {
            warn!("Failed to load configuration from {}: {}. Using defaults.", config_path, err);
            ExecutorConfig::default()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
