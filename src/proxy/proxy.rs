// ────────────────────────────────
// src/proxy/proxy.rs
// Top-level routing entry point: select a backend, forward, reroute on failover.
// ────────────────────────────────

use hyper::{Body, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use super::pool::BackendPool;
use super::request::{BodyError, ProxyRequest};
use crate::config::{ProxyConfig, RetryConfig};
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::{FailoverController, FailoverOutcome, RequestContext, RetryStrategy};

pub struct Proxy {
    pool: Arc<BackendPool>,
    failover: FailoverController,
    metrics: Option<Arc<MetricsCollector>>,
    max_body_bytes: usize,
}

impl Proxy {
    pub fn new(
        pool: Arc<BackendPool>,
        retry: RetryConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let failover =
            FailoverController::new(RetryStrategy::new(retry), pool.clone(), metrics.clone());
        Self {
            pool,
            failover,
            metrics,
            max_body_bytes: ProxyConfig::default().max_body_bytes,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub async fn handle(
        &self,
        req: Request<Body>,
        remote_addr: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<Response<Body>, ProxyError> {
        let timer = Timer::new();
        let result = self.handle_inner(req, remote_addr, cancel).await;

        if let Some(metrics) = &self.metrics {
            let status = match &result {
                Ok(response) => response.status(),
                Err(e) => e.status(),
            };
            metrics.record_request(status.as_u16(), timer.elapsed());
        }
        result
    }

    async fn handle_inner(
        &self,
        req: Request<Body>,
        remote_addr: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Result<Response<Body>, ProxyError> {
        let mut request = ProxyRequest::from_hyper(req, remote_addr, self.max_body_bytes)
            .await
            .map_err(|e| match e {
                BodyError::TooLarge(limit) => {
                    debug!(limit, "Request body over limit");
                    ProxyError::BodyTooLarge(limit)
                }
                BodyError::Read(e) => ProxyError::Body(e.to_string()),
            })?;

        let request_id = match request.request_id() {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                request.set_request_id(&id);
                id
            }
        };

        let ctx = RequestContext::new(request_id, remote_addr, cancel);
        debug!(
            request_id = %ctx.request_id,
            client = %ctx.client(),
            method = %request.method,
            path = request.path(),
            "Routing request"
        );
        self.dispatch(&request, ctx).await
    }

    /// Route `request` to the next live backend, re-dispatching with the
    /// carried context whenever the failover controller condemns a backend.
    pub async fn dispatch(
        &self,
        request: &ProxyRequest,
        ctx: RequestContext,
    ) -> Result<Response<Body>, ProxyError> {
        let mut ctx = ctx;

        loop {
            if ctx.is_cancelled() {
                debug!(request_id = %ctx.request_id, attempts = ctx.attempts, "Request cancelled");
                return Err(ProxyError::Cancelled);
            }

            if !self.failover.strategy().may_attempt(ctx.attempts) {
                error!(
                    request_id = %ctx.request_id,
                    client = %ctx.client(),
                    path = request.path(),
                    attempts = ctx.attempts,
                    "Max attempts reached, terminating"
                );
                return Err(ProxyError::AttemptsExhausted(ctx.attempts));
            }

            let Some(peer) = self.pool.next_peer() else {
                error!(
                    request_id = %ctx.request_id,
                    client = %ctx.client(),
                    path = request.path(),
                    attempts = ctx.attempts,
                    "No live backend available"
                );
                return Err(ProxyError::NoBackendAvailable);
            };

            debug!(
                request_id = %ctx.request_id,
                backend = %peer.id,
                attempts = ctx.attempts,
                "Forwarding request"
            );

            match self.failover.forward(&peer, request, ctx).await {
                FailoverOutcome::Served(response) => return Ok(response),
                FailoverOutcome::Reroute(next) => ctx = next,
                FailoverOutcome::Cancelled => return Err(ProxyError::Cancelled),
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No live backend available")]
    NoBackendAvailable,

    #[error("Request gave up after {0} backend attempts")]
    AttemptsExhausted(u32),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoBackendAvailable
            | ProxyError::AttemptsExhausted(_)
            | ProxyError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match &err {
            ProxyError::Body(_) => "Bad request",
            ProxyError::BodyTooLarge(_) => "Payload too large",
            _ => "Service not available",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status();
        response
    }
}
