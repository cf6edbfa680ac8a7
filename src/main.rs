// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use failover_lb::{
    cli::Args,
    health::HealthChecker,
    metrics::MetricsRegistry,
    proxy::{BackendPool, Proxy},
    server::{start_admin_server, RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("failover_lb=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config = Args::parse()
        .into_config()
        .await
        .context("Invalid configuration")?;

    let pool = Arc::new(
        BackendPool::from_config(&config.backends, &config.proxy)
            .context("Failed to build backend pool")?,
    );
    info!(
        backends = pool.len(),
        algorithm = pool.algorithm(),
        retry_limit = config.retry.retry_limit,
        max_attempts = config.retry.max_attempts,
        "Backend pool ready"
    );

    let metrics_registry = if config.metrics.enabled {
        Some(MetricsRegistry::new()?)
    } else {
        None
    };
    let metrics = metrics_registry.as_ref().map(|r| r.collector());
    if let Some(metrics) = &metrics {
        metrics.update_backend_counts(pool.alive_count(), pool.len());
        for backend in pool.all_backends() {
            metrics.update_backend_liveness(&backend.id, backend.is_alive());
        }
    }

    let shutdown = CancellationToken::new();

    if config.health_check.enabled {
        let checker = Arc::new(HealthChecker::new(
            config.health_check.clone(),
            pool.clone(),
            metrics.clone(),
        )?);
        tokio::spawn(checker.start(shutdown.child_token()));
    }

    if let Some(registry) = metrics_registry {
        let admin_addr = SocketAddr::new(config.server.bind_address, config.metrics.port);
        start_admin_server(
            admin_addr,
            registry,
            pool.clone(),
            config.metrics.path.clone(),
            shutdown.child_token(),
        )
        .await?;
    }

    let proxy = Arc::new(
        Proxy::new(pool, config.retry.clone(), metrics)
            .with_max_body_bytes(config.proxy.max_body_bytes),
    );
    let handler = RequestHandler::new(proxy);

    let addr = config.listen_addr();
    info!("Starting load balancer on {}", addr);

    let server = ServerBuilder::new(addr)
        .with_handler(handler)
        .with_shutdown(shutdown.clone())
        .serve();

    tokio::select! {
        result = server => {
            if let Err(e) = &result {
                error!("Server error: {:#}", e);
            }
            shutdown.cancel();
            result
        }
        _ = shutdown_signal() => {
            shutdown.cancel();
            Ok(())
        }
    }
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
