//! Kubernetes probes
//!
//! - `/healthz` - Liveness: the process is serving HTTP
//! - `/readyz` - Readiness: the adapter can reach its cluster and accept operations

use axum::{extract::State, http::StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared readiness flag
///
/// Starts not ready. `main` flips it once the configuration is loaded and
/// the ambient cluster has been probed, and flips it back on shutdown.
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Stop advertising readiness, e.g. while draining on shutdown
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

pub(super) async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// 200 when ready, 503 otherwise
pub(super) async fn readyz(State(readiness): State<ReadinessState>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
