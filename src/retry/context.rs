// src/retry/context.rs
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-request retry state, rebuilt on every retry and re-dispatch.
///
/// `retries` counts failed forwards against the current backend and is reset
/// when the request moves to a new backend. `attempts` counts backend hops and
/// is only ever carried forward.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Arc<str>,
    pub remote_addr: Option<SocketAddr>,
    pub retries: u32,
    pub attempts: u32,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(
        request_id: impl Into<Arc<str>>,
        remote_addr: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            remote_addr,
            retries: 0,
            attempts: 0,
            cancel,
        }
    }

    /// Same backend, one more retry.
    pub fn with_retry(&self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self.clone()
        }
    }

    /// New backend: retries start over, the hop is counted.
    pub fn rerouted(&self) -> Self {
        Self {
            retries: 0,
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Client address for logging, `-` when unknown.
    pub fn client(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}
