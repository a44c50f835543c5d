//! Registration consumer: a Tokio task that takes one delivery at a time from
//! its transport, runs it through the pipeline and settles it.

use crate::processor::RegistrationProcessor;
use crate::transport::{Delivery, QueueTransport};
use regmobile_core::outcome::ProcessingOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct RegistrationConsumer {
    pub consumer_id: String,
    pub node_id: String,
    processor: Arc<RegistrationProcessor>,
    transport: Arc<dyn QueueTransport>,
}

impl RegistrationConsumer {
    pub fn new(
        consumer_id: String,
        node_id: String,
        processor: Arc<RegistrationProcessor>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            consumer_id,
            node_id,
            processor,
            transport,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume until the transport closes. Transport errors are logged and
    /// never end the loop.
    pub async fn run(self) {
        info!(
            consumer_id = %self.consumer_id,
            node_id = %self.node_id,
            "Consumer started"
        );

        loop {
            match self.transport.receive().await {
                Ok(Some(delivery)) => {
                    self.process_one(&delivery).await;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(consumer_id = %self.consumer_id, error = %e, "Receive failed");
                    metrics::counter!("consumer.receive_errors").increment(1);
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }

        warn!(consumer_id = %self.consumer_id, "Queue closed, consumer stopping");
    }

    /// Process and settle a single delivery.
    pub async fn process_one(&self, delivery: &Delivery) -> ProcessingOutcome {
        let outcome = self.processor.process(delivery).await;
        self.execute(delivery, &outcome).await;
        outcome
    }

    async fn execute(&self, delivery: &Delivery, outcome: &ProcessingOutcome) {
        let result = match outcome {
            ProcessingOutcome::Acknowledge => self.transport.ack(delivery).await,
            ProcessingOutcome::RetryLater { delay_seconds } => {
                self.transport
                    .nack_requeue(delivery, Duration::from_secs(*delay_seconds))
                    .await
            }
            ProcessingOutcome::DeadLetter {
                reason_code,
                detail,
            } => {
                self.transport
                    .nack_dead_letter(delivery, reason_code, detail)
                    .await
            }
        };

        match result {
            Ok(()) => debug!(
                consumer_id = %self.consumer_id,
                delivery_id = %delivery.id,
                outcome = outcome.label(),
                "Delivery settled"
            ),
            Err(e) => {
                error!(
                    consumer_id = %self.consumer_id,
                    delivery_id = %delivery.id,
                    outcome = outcome.label(),
                    error = %e,
                    "Failed to settle delivery"
                );
                metrics::counter!("consumer.settle_errors", "outcome" => outcome.label())
                    .increment(1);
            }
        }
    }
}
