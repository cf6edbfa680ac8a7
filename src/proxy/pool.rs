//
// src/proxy/pool.rs
//

use super::backend::Backend;
use super::forwarder::{build_client, HttpForwarder};
use crate::config::{BackendConfig, ProxyConfig};
use crate::load_balancer::{LoadBalancer, RoundRobinBalancer};
use std::sync::Arc;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Backend pool must contain at least one backend")]
    Empty,
}

/// Fixed, ordered set of backends plus the selection cursor.
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    balancer: RoundRobinBalancer,
}

impl BackendPool {
    pub fn new(backends: Vec<Backend>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::Empty);
        }

        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            balancer: RoundRobinBalancer::new(),
        })
    }

    /// One `HttpForwarder` per backend, all sharing a single connection pool.
    pub fn from_config(configs: &[BackendConfig], proxy: &ProxyConfig) -> Result<Self, PoolError> {
        let client = build_client();
        let backends = configs
            .iter()
            .map(|config| {
                let forwarder =
                    HttpForwarder::new(config.url.clone(), client.clone(), proxy.timeout());
                Backend::new(config.url.clone(), Arc::new(forwarder))
            })
            .collect();

        Self::new(backends)
    }

    /// Next live backend in round-robin order, `None` on total outage.
    pub fn next_peer(&self) -> Option<Arc<Backend>> {
        self.balancer.select_backend(&self.backends)
    }

    pub fn algorithm(&self) -> &'static str {
        self.balancer.name()
    }

    /// Set liveness by URL; true only when a backend with this URL changed state.
    pub fn mark_backend_status(&self, url: &Url, alive: bool) -> bool {
        match self.backends.iter().find(|b| &b.url == url) {
            Some(backend) => {
                let changed = backend.set_alive(alive);
                if changed {
                    tracing::debug!(backend = %backend.id, alive, "Backend status changed");
                }
                changed
            }
            None => false,
        }
    }

    pub fn get_backend(&self, id: &str) -> Option<Arc<Backend>> {
        self.backends.iter().find(|b| b.id == id).cloned()
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(urls: &[&str]) -> Vec<BackendConfig> {
        urls.iter().map(|u| BackendConfig::parse(u).unwrap()).collect()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(BackendPool::new(Vec::new()), Err(PoolError::Empty)));
    }

    #[tokio::test]
    async fn test_from_config_preserves_order() {
        let pool = BackendPool::from_config(
            &configs(&["http://a:3031", "http://b:3032", "http://c:3033"]),
            &ProxyConfig::default(),
        )
        .unwrap();

        let ids: Vec<_> = pool.all_backends().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["a:3031", "b:3032", "c:3033"]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.alive_count(), 3);
        assert_eq!(pool.algorithm(), "round_robin");
    }

    #[tokio::test]
    async fn test_mark_backend_status_by_url() {
        let pool = BackendPool::from_config(
            &configs(&["http://a:3031", "http://b:3032"]),
            &ProxyConfig::default(),
        )
        .unwrap();

        let b_url = Url::parse("http://b:3032").unwrap();
        assert!(pool.mark_backend_status(&b_url, false));
        assert!(!pool.get_backend("b:3032").unwrap().is_alive());
        assert_eq!(pool.alive_count(), 1);
        // No change, no report.
        assert!(!pool.mark_backend_status(&b_url, false));

        // Only a is left.
        for _ in 0..3 {
            assert_eq!(pool.next_peer().unwrap().id, "a:3031");
        }

        let unknown = Url::parse("http://z:1").unwrap();
        assert!(!pool.mark_backend_status(&unknown, false));
    }
}
