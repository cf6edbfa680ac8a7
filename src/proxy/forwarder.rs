// src/proxy/forwarder.rs
// Opaque forwarding handle: relays one attempt of a request to one backend.

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Response};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use url::Url;

use super::request::ProxyRequest;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Connection to backend failed: {0}")]
    Connect(String),

    #[error("Backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Invalid backend target: {0}")]
    InvalidTarget(String),
}

/// Every call is one forwarding attempt; a failed attempt yields exactly one error.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: &ProxyRequest) -> Result<Response<Body>, ForwardError>;
}

pub type HttpsClient = Client<HttpsConnector<HttpConnector>>;

pub fn build_client() -> HttpsClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

#[derive(Clone)]
pub struct HttpForwarder {
    target: Url,
    client: HttpsClient,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(target: Url, client: HttpsClient, timeout: Duration) -> Self {
        Self {
            target,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: &ProxyRequest) -> Result<Response<Body>, ForwardError> {
        let outbound = request.to_backend_request(&self.target)?;

        match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ForwardError::Connect(e.to_string())),
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        }
    }
}
