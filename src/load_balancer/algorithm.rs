// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use std::sync::Arc;

pub trait LoadBalancer: Send + Sync {
    /// Pick a live backend, or `None` when every backend is down.
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
