//! Minimal health/readiness HTTP surface for the pod executor process.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared readiness flag flipped once the watcher has completed its first
/// successful pass and the scheduler's `clear_queued` call has returned.
#[derive(Clone, Default)]
pub struct ReadinessState(Arc<AtomicBool>);

impl ReadinessState {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn router(state: ReadinessState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pod-executor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<ReadinessState>) -> Result<Json<Value>, StatusCode> {
    if state.is_ready() {
        Ok(Json(json!({
            "status": "ready",
            "service": "pod-executor",
            "version": env!("CARGO_PKG_VERSION"),
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_state_starts_unready() {
        let state = ReadinessState::new();
        assert!(!state.is_ready());
        state.mark_ready();
        assert!(state.is_ready());
    }
}
