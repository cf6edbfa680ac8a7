// src/cli.rs
use crate::config::{self, BackendConfig, Config};
use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

/// Round-robin reverse proxy with retry and failover.
#[derive(Debug, Parser)]
#[command(name = "failover-lb", version, about)]
pub struct Args {
    /// Path to a YAML or JSON configuration file
    #[arg(short, long, env = "LB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma separated backend URLs, replaces the configured list
    #[arg(short, long, env = "LB_BACKENDS", value_delimiter = ',')]
    pub backends: Vec<String>,

    /// Port to listen on
    #[arg(short, long, env = "LB_PORT")]
    pub port: Option<u16>,
}

impl Args {
    pub async fn into_config(self) -> Result<Config> {
        if self.config.is_none() && self.backends.is_empty() {
            bail!("Either --config or --backends must be provided");
        }

        let mut config = match &self.config {
            Some(path) => config::load_config(path).await?,
            None => Config::default(),
        };

        self.apply_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        let backends = self
            .backends
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| BackendConfig::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        if !backends.is_empty() {
            config.backends = backends;
        }

        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backends_flag_builds_config() {
        let args = Args::parse_from([
            "failover-lb",
            "--backends",
            "http://localhost:3031,http://localhost:3032",
            "--port",
            "8000",
        ]);
        let config = args.into_config().await.unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.server.port, 8000);
    }

    #[tokio::test]
    async fn test_requires_backends_or_config() {
        let args = Args {
            config: None,
            backends: Vec::new(),
            port: None,
        };
        assert!(args.into_config().await.is_err());
    }

    #[tokio::test]
    async fn test_bad_backend_flag_is_config_error() {
        let args = Args {
            config: None,
            backends: vec!["localhost 3031".to_string()],
            port: None,
        };
        assert!(args.into_config().await.is_err());
    }
}
