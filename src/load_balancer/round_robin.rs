// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round robin that skips dead backends.
///
/// `counter` holds the slot the next selection starts scanning from. When a
/// scan has to skip dead slots, the counter is moved past the backend that was
/// actually used, so later callers do not keep landing on the same dead slot.
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    pub fn cursor(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::SeqCst);
        let next = start % len;

        for i in next..next + len {
            let idx = i % len;
            let backend = &backends[idx];
            if !backend.is_alive() {
                continue;
            }

            if idx != next {
                // Only move the cursor if no other selection advanced it meanwhile.
                let _ = self.counter.compare_exchange(
                    start.wrapping_add(1),
                    idx + 1,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                );
            }
            return Some(backend.clone());
        }

        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
