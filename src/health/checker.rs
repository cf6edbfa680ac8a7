// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use anyhow::{anyhow, Result};
use reqwest::Client;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodically probes every backend and reports liveness through
/// `Backend::set_alive`, the only write path it uses.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub alive: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow!("Failed to create health check client: {}", e))?;

        Ok(Self {
            config,
            pool,
            client,
            metrics,
        })
    }

    pub async fn start(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.config.interval(),
            probe = self.config.path.as_deref().unwrap_or("tcp"),
            "Starting health checker"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().check_all_backends().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Health checker shutting down");
                    break;
                }
            }
        }
    }

    pub async fn check_all_backends(self: Arc<Self>) {
        let tasks: Vec<_> = self
            .pool
            .all_backends()
            .iter()
            .cloned()
            .map(|backend| {
                let checker = self.clone();
                tokio::spawn(async move { checker.check_backend(backend).await })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        let mut alive_count = 0;
        let mut dead_count = 0;

        for result in results {
            match result {
                Ok(check) if check.alive => {
                    alive_count += 1;
                    debug!(backend = %check.backend_id, ms = check.response_time_ms, "Backend is alive");
                }
                Ok(check) => {
                    dead_count += 1;
                    debug!(backend = %check.backend_id, error = ?check.error, "Backend is down");
                }
                Err(e) => {
                    error!("Health check task failed: {}", e);
                    dead_count += 1;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(self.pool.alive_count(), self.pool.len());
        }

        info!(
            "Health check complete: {} alive, {} down",
            alive_count, dead_count
        );
    }

    pub async fn check_backend(&self, backend: Arc<Backend>) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let outcome = match &self.config.path {
            Some(path) => self.probe_http(&backend, path).await,
            None => self.probe_tcp(&backend).await,
        };
        let response_time_ms = start.elapsed().as_millis() as u64;

        let alive = outcome.is_ok();
        let error = outcome.err().map(|e| e.to_string());

        if backend.set_alive(alive) {
            if alive {
                info!(backend = %backend.id, "Backend is back up");
            } else {
                warn!(backend = %backend.id, error = ?error, "Backend is down");
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_liveness(&backend.id, alive);
        }

        HealthCheckResult {
            backend_id: backend.id.clone(),
            alive,
            response_time_ms,
            error,
        }
    }

    async fn probe_http(&self, backend: &Backend, path: &str) -> Result<()> {
        let url = backend.url.join(path)?;
        let response = timeout(self.config.timeout(), self.client.get(url.as_str()).send())
            .await
            .map_err(|_| anyhow!("Request timeout"))??;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("HTTP {}", status))
        }
    }

    async fn probe_tcp(&self, backend: &Backend) -> Result<()> {
        let host = backend
            .url
            .host_str()
            .ok_or_else(|| anyhow!("Backend {} has no host", backend.url))?;
        let port = backend
            .url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Backend {} has no port", backend.url))?;

        timeout(self.config.timeout(), TcpStream::connect((host, port)))
            .await
            .map_err(|_| anyhow!("Connect timeout"))??;
        Ok(())
    }
}
