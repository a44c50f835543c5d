//! Consumer manager: spawns and supervises N registration consumers per node.

use crate::agent::RegistrationConsumer;
use crate::jetstream::JetStreamTransport;
use crate::processor::RegistrationProcessor;
use crate::transport::QueueTransport;
use regmobile_core::config::AppConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Manages the lifecycle of all consumers on this node.
pub struct ConsumerManager {
    config: AppConfig,
    processor: Arc<RegistrationProcessor>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerManager {
    pub fn new(config: AppConfig, processor: Arc<RegistrationProcessor>) -> Self {
        Self {
            config,
            processor,
            handles: Vec::new(),
        }
    }

    /// Connect to NATS and spawn `consumers_per_node` consumers, each bound
    /// to its own JetStream message stream.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let nats_url = self
            .config
            .nats
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        info!(url = %nats_url, "Connecting to NATS");

        let nats_client = async_nats::ConnectOptions::new()
            .max_reconnects(Some(self.config.nats.max_reconnects))
            .connect(&nats_url)
            .await?;

        info!("NATS connection established");

        let context = async_nats::jetstream::new(nats_client);

        let mut transports: Vec<Arc<dyn QueueTransport>> = Vec::new();
        for _ in 0..self.config.consumers_per_node {
            let transport = JetStreamTransport::connect(context.clone(), &self.config.nats).await?;
            transports.push(Arc::new(transport));
        }

        self.spawn_consumers(transports);
        Ok(())
    }

    /// Spawn one consumer per transport.
    pub fn spawn_consumers(&mut self, transports: Vec<Arc<dyn QueueTransport>>) {
        let count = transports.len();

        for transport in transports {
            let consumer_id = format!("{}-consumer-{:02}", self.config.node_id, self.handles.len());
            let consumer = RegistrationConsumer::new(
                consumer_id.clone(),
                self.config.node_id.clone(),
                self.processor.clone(),
                transport,
            );
            self.handles.push(consumer.spawn());
            info!(consumer_id = %consumer_id, "Consumer spawned");
        }

        info!(count, node = %self.config.node_id, "All consumers started");
    }

    /// Wait for all consumers to complete (blocks until shutdown).
    pub async fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Consumer task panicked");
            }
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.handles.len()
    }
}
