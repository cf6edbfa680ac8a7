// src/server/admin.rs
// Admin listener: prometheus exposition and backend liveness status.

use anyhow::Result;
use chrono::{DateTime, Utc};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::metrics::MetricsRegistry;
use crate::proxy::BackendPool;

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub url: String,
    pub alive: bool,
    pub last_change: Option<DateTime<Utc>>,
}

struct AdminState {
    registry: MetricsRegistry,
    pool: Arc<BackendPool>,
    metrics_path: String,
}

pub async fn start_admin_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    pool: Arc<BackendPool>,
    metrics_path: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = Arc::new(AdminState {
        registry,
        pool,
        metrics_path,
    });
    let service_state = state.clone();

    let make_service = make_service_fn(move |_| {
        let state = service_state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(route(&state, req)) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?
        .serve(make_service)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    info!(
        "Admin server listening on http://{} (metrics at {}, status at /status)",
        addr, state.metrics_path
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Admin server error: {}", e);
        }
    });

    Ok(())
}

fn route(state: &AdminState, req: Request<Body>) -> Response<Body> {
    if *req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    let path = req.uri().path();
    if path == state.metrics_path {
        match state.registry.gather() {
            Ok(body) => with_content_type(
                Response::new(Body::from(body)),
                "text/plain; version=0.0.4",
            ),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    } else if path == "/status" {
        let statuses = backend_statuses(&state.pool);
        match serde_json::to_vec(&statuses) {
            Ok(body) => with_content_type(Response::new(Body::from(body)), "application/json"),
            Err(e) => {
                error!("Failed to encode status: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    } else {
        text(StatusCode::NOT_FOUND, "Not Found")
    }
}

pub fn backend_statuses(pool: &BackendPool) -> Vec<BackendStatus> {
    pool.all_backends()
        .iter()
        .map(|b| BackendStatus {
            id: b.id.clone(),
            url: b.url.to_string(),
            alive: b.is_alive(),
            last_change: b.last_change(),
        })
        .collect()
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Body>, value: &'static str) -> Response<Body> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(value));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, ProxyConfig};

    fn state() -> AdminState {
        let configs = vec![
            BackendConfig::parse("http://a:3031").unwrap(),
            BackendConfig::parse("http://b:3032").unwrap(),
        ];
        AdminState {
            registry: MetricsRegistry::new().unwrap(),
            pool: Arc::new(BackendPool::from_config(&configs, &ProxyConfig::default()).unwrap()),
            metrics_path: "/metrics".to_string(),
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_status_lists_backend_liveness() {
        let state = state();
        state.pool.all_backends()[1].set_alive(false);

        let response = route(&state, get("/status"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json[0]["id"], "a:3031");
        assert_eq!(json[0]["alive"], true);
        assert!(json[0]["last_change"].is_null());
        assert_eq!(json[1]["alive"], false);
        assert!(json[1]["last_change"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_and_not_found() {
        let state = state();
        state.registry.collector().record_reroute();

        let response = route(&state, get("/metrics"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("lb_reroutes_total 1"));

        assert_eq!(route(&state, get("/nope")).status(), StatusCode::NOT_FOUND);
    }
}
