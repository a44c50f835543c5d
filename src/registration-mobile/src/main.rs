//! Registration Mobile: queue consumer that forwards user registrations to
//! SMS marketing providers.
//!
//! Main entry point that initializes logging, metrics and the consumers.

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use regmobile_agents::{ConsumerManager, RegistrationProcessor};
use regmobile_core::config::AppConfig;
use regmobile_core::event_bus::tracing_sink;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "registration-mobile")]
#[command(about = "Consumes registration events and subscribes users with mobile providers")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "REGISTRATION_MOBILE_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "REGISTRATION_MOBILE__NODE_ID")]
    node_id: Option<String>,

    /// Number of consumers per node (overrides config)
    #[arg(long, env = "REGISTRATION_MOBILE__CONSUMERS_PER_NODE")]
    consumers: Option<usize>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "REGISTRATION_MOBILE__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Do not start the Prometheus exporter
    #[arg(long, default_value_t = false)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registration_mobile=info,regmobile=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Registration Mobile starting up");

    // An explicit config file must load; otherwise fall back to defaults.
    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(consumers) = cli.consumers {
        config.consumers_per_node = consumers;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_metrics {
        config.metrics.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        consumers = config.consumers_per_node,
        subject = %config.nats.subject,
        retry_delay_secs = config.retry.delay_secs,
        max_attempts = config.retry.max_attempts,
        soft_error_policy = ?config.retry.soft_error_policy,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        if let Err(e) = start_metrics(&config) {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    let processor = Arc::new(RegistrationProcessor::from_config(&config, tracing_sink())?);

    let mut manager = ConsumerManager::new(config.clone(), processor);
    manager.start().await?;

    info!(
        consumers = manager.consumer_count(),
        "Registration Mobile is consuming"
    );

    tokio::select! {
        _ = manager.wait() => {
            warn!("All consumers stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn start_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let host: IpAddr = config.metrics.host.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(host, config.metrics.port))
        .install()?;

    info!(port = config.metrics.port, "Metrics exporter started");
    Ok(())
}
