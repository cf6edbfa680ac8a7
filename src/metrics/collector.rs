// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Failover metrics
    pub forward_failures_total: IntCounterVec,
    pub retries_total: IntCounterVec,
    pub reroutes_total: IntCounter,
    pub backend_demotions_total: IntCounterVec,

    // Backend liveness
    pub backend_alive: IntGaugeVec,
    pub alive_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds, including retries and reroutes",
            ),
            &["status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let forward_failures_total = IntCounterVec::new(
            Opts::new(
                "lb_forward_failures_total",
                "Failed forwarding attempts per backend",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(forward_failures_total.clone()))?;

        let retries_total = IntCounterVec::new(
            Opts::new("lb_retries_total", "Same-backend retries per backend"),
            &["backend"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let reroutes_total =
            IntCounter::new("lb_reroutes_total", "Requests rerouted to another backend")?;
        registry.register(Box::new(reroutes_total.clone()))?;

        let backend_demotions_total = IntCounterVec::new(
            Opts::new(
                "lb_backend_demotions_total",
                "Times a backend was marked dead after exhausting its retries",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_demotions_total.clone()))?;

        let backend_alive = IntGaugeVec::new(
            Opts::new("lb_backend_alive", "Backend liveness (1=alive, 0=dead)"),
            &["backend"],
        )?;
        registry.register(Box::new(backend_alive.clone()))?;

        let alive_backends = IntGauge::new("lb_alive_backends", "Number of alive backends")?;
        registry.register(Box::new(alive_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            forward_failures_total,
            retries_total,
            reroutes_total,
            backend_demotions_total,
            backend_alive,
            alive_backends,
            total_backends,
        })
    }

    pub fn record_request(&self, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.requests_total.with_label_values(&[status.as_str()]).inc();
        self.request_duration_seconds
            .with_label_values(&[status.as_str()])
            .observe(duration.as_secs_f64());
    }

    pub fn record_forward_failure(&self, backend: &str) {
        self.forward_failures_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_retry(&self, backend: &str) {
        self.retries_total.with_label_values(&[backend]).inc();
    }

    pub fn record_demotion(&self, backend: &str) {
        self.backend_demotions_total
            .with_label_values(&[backend])
            .inc();
        self.update_backend_liveness(backend, false);
    }

    pub fn record_reroute(&self) {
        self.reroutes_total.inc();
    }

    pub fn update_backend_liveness(&self, backend: &str, alive: bool) {
        self.backend_alive
            .with_label_values(&[backend])
            .set(i64::from(alive));
    }

    pub fn update_backend_counts(&self, alive: usize, total: usize) {
        self.alive_backends.set(alive as i64);
        self.total_backends.set(total as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
