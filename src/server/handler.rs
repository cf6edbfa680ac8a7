// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::proxy::Proxy;

/// Per-connection service. Every request gets its own cancellation token,
/// a child of the server shutdown token, cancelled when the request future is
/// dropped (the client went away).
#[derive(Clone)]
pub struct RequestHandler {
    proxy: Arc<Proxy>,
    remote_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
}

impl RequestHandler {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self {
            proxy,
            remote_addr: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Bind a copy of this handler to one accepted connection.
    pub fn for_peer(&self, peer: SocketAddr) -> Self {
        Self {
            remote_addr: Some(peer),
            ..self.clone()
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let proxy = self.proxy.clone();
        let remote_addr = self.remote_addr;
        let cancel = self.shutdown.child_token();

        Box::pin(async move {
            let _guard = cancel.clone().drop_guard();
            match proxy.handle(req, remote_addr, cancel).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    tracing::debug!(%e, "proxy error");
                    Ok(e.into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::proxy::{Backend, BackendPool, ForwardError, Forwarder, ProxyRequest};
    use async_trait::async_trait;
    use hyper::StatusCode;
    use url::Url;

    struct Down;

    #[async_trait]
    impl Forwarder for Down {
        async fn forward(&self, _request: &ProxyRequest) -> Result<Response<Body>, ForwardError> {
            Err(ForwardError::Connect("refused".into()))
        }
    }

    #[tokio::test]
    async fn test_errors_become_service_unavailable() {
        let backend = Backend::new(Url::parse("http://down:80").unwrap(), Arc::new(Down));
        let pool = Arc::new(BackendPool::new(vec![backend]).unwrap());
        let retry = RetryConfig {
            delay_ms: 1,
            max_delay_ms: 1,
            ..RetryConfig::default()
        };
        let mut handler = RequestHandler::new(Arc::new(Proxy::new(pool, retry, None)))
            .for_peer("127.0.0.1:40000".parse().unwrap());

        let response = handler.call(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_slow_retry() {
        let backend = Backend::new(Url::parse("http://down:80").unwrap(), Arc::new(Down));
        let pool = Arc::new(BackendPool::new(vec![backend]).unwrap());
        let retry = RetryConfig {
            delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..RetryConfig::default()
        };
        let shutdown = CancellationToken::new();
        let mut handler = RequestHandler::new(Arc::new(Proxy::new(pool.clone(), retry, None)))
            .with_shutdown(shutdown.clone())
            .for_peer("127.0.0.1:40000".parse().unwrap());

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let response = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            handler.call(Request::new(Body::empty())),
        )
        .await
        .expect("shutdown did not interrupt the retry delay")
        .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // Interrupted mid-retry, so the backend was never condemned.
        assert!(pool.all_backends()[0].is_alive());
    }
}
