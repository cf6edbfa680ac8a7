// src/retry/failover.rs
//
// Forwarding-error state machine for one request against one backend:
// Retrying (same backend, bounded) -> Rerouting (backend marked dead, caller
// selects another). Exhaustion is decided by the dispatch loop in `Proxy`.

use hyper::{Body, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::strategy::{RetryDecision, RetryStrategy};
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool, ForwardError, ProxyRequest};

#[derive(Debug)]
pub enum FailoverOutcome {
    /// The backend answered; its response is relayed as is.
    Served(Response<Body>),
    /// The backend was condemned; dispatch again with this context.
    Reroute(RequestContext),
    /// The client went away or the server is shutting down.
    Cancelled,
}

#[derive(Debug)]
pub enum FailoverStep {
    Retry { ctx: RequestContext, delay: Duration },
    Reroute { ctx: RequestContext },
}

pub struct FailoverController {
    strategy: RetryStrategy,
    pool: Arc<BackendPool>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FailoverController {
    pub fn new(
        strategy: RetryStrategy,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            strategy,
            pool,
            metrics,
        }
    }

    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// Forward `request` to `backend`, retrying it until it either answers or
    /// runs out of retries for this request.
    pub async fn forward(
        &self,
        backend: &Backend,
        request: &ProxyRequest,
        ctx: RequestContext,
    ) -> FailoverOutcome {
        let mut ctx = ctx;

        loop {
            if ctx.is_cancelled() {
                debug!(request_id = %ctx.request_id, backend = %backend.id, "Request cancelled before forwarding");
                return FailoverOutcome::Cancelled;
            }

            let result = tokio::select! {
                _ = ctx.cancellation().cancelled() => return FailoverOutcome::Cancelled,
                result = backend.forward(request) => result,
            };

            let error = match result {
                Ok(response) => {
                    debug!(
                        request_id = %ctx.request_id,
                        backend = %backend.id,
                        status = %response.status(),
                        retries = ctx.retries,
                        attempts = ctx.attempts,
                        "Request served"
                    );
                    return FailoverOutcome::Served(response);
                }
                Err(error) => error,
            };

            match self.on_forward_error(backend, &ctx, &error) {
                FailoverStep::Retry { ctx: next, delay } => {
                    tokio::select! {
                        _ = ctx.cancellation().cancelled() => {
                            debug!(request_id = %ctx.request_id, "Request cancelled during retry delay");
                            return FailoverOutcome::Cancelled;
                        }
                        _ = sleep(delay) => {}
                    }
                    ctx = next;
                }
                FailoverStep::Reroute { ctx: next } => return FailoverOutcome::Reroute(next),
            }
        }
    }

    /// Apply one failed forward: either schedule a retry against the same
    /// backend, or mark it dead and hand back the context for a new hop.
    pub fn on_forward_error(
        &self,
        backend: &Backend,
        ctx: &RequestContext,
        error: &ForwardError,
    ) -> FailoverStep {
        warn!(
            request_id = %ctx.request_id,
            backend = %backend.id,
            client = %ctx.client(),
            url = %backend.url,
            retries = ctx.retries,
            attempts = ctx.attempts,
            %error,
            "Forward failed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_forward_failure(&backend.id);
        }

        match self.strategy.decide(ctx) {
            RetryDecision::Retry { delay } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(&backend.id);
                }
                FailoverStep::Retry {
                    ctx: ctx.with_retry(),
                    delay,
                }
            }
            RetryDecision::Reroute => {
                if self.pool.mark_backend_status(&backend.url, false) {
                    warn!(
                        request_id = %ctx.request_id,
                        backend = %backend.id,
                        failures = ctx.retries + 1,
                        "Backend marked dead"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_demotion(&backend.id);
                        metrics.update_backend_counts(self.pool.alive_count(), self.pool.len());
                    }
                } else {
                    debug!(backend = %backend.id, "Backend already marked dead");
                }

                let next = ctx.rerouted();
                warn!(
                    request_id = %next.request_id,
                    client = %next.client(),
                    from = %backend.id,
                    attempts = next.attempts,
                    "Rerouting request"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_reroute();
                }
                FailoverStep::Reroute { ctx: next }
            }
        }
    }
}
