// src/proxy/backend.rs
use chrono::{DateTime, Utc};
use hyper::{Body, Response};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

use super::forwarder::{ForwardError, Forwarder};
use super::request::ProxyRequest;

#[derive(Debug, Clone, Copy)]
struct Liveness {
    alive: bool,
    last_change: Option<DateTime<Utc>>,
}

pub struct Backend {
    pub id: String,
    pub url: Url,
    liveness: RwLock<Liveness>,
    forwarder: Arc<dyn Forwarder>,
}

impl Backend {
    /// Backends start out alive.
    pub fn new(url: Url, forwarder: Arc<dyn Forwarder>) -> Self {
        let id = format!(
            "{}:{}",
            url.host_str().unwrap_or("unknown"),
            url.port_or_known_default().unwrap_or(80)
        );

        Self {
            id,
            url,
            liveness: RwLock::new(Liveness {
                alive: true,
                last_change: None,
            }),
            forwarder,
        }
    }

    pub fn is_alive(&self) -> bool {
        // The flag is a plain bool; a poisoned lock still holds a valid value.
        self.liveness
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .alive
    }

    /// Returns true when the flag actually changed.
    pub fn set_alive(&self, alive: bool) -> bool {
        let mut liveness = self
            .liveness
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if liveness.alive == alive {
            return false;
        }
        liveness.alive = alive;
        liveness.last_change = Some(Utc::now());
        true
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.liveness
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_change
    }

    pub async fn forward(&self, request: &ProxyRequest) -> Result<Response<Body>, ForwardError> {
        self.forwarder.forward(request).await
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("alive", &self.is_alive())
            .finish()
    }
}
