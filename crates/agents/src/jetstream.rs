//! NATS JetStream queue transport.
//!
//! A durable pull consumer with explicit acks and no delivery ceiling on the
//! server side; the attempt ceiling is applied by the classifier from the
//! JetStream delivered count. Dead letters are republished with their reason
//! to a separate stream, then terminated on the work stream.

use crate::transport::{Delivery, QueueTransport};
use async_nats::jetstream::{self, consumer, consumer::pull, stream, AckKind};
use async_nats::HeaderMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use regmobile_core::config::NatsConfig;
use regmobile_core::error::{RegistrationError, RegistrationResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

pub const HEADER_REASON: &str = "Registration-Dead-Letter-Reason";
pub const HEADER_DETAIL: &str = "Registration-Dead-Letter-Detail";
pub const HEADER_DELIVERY: &str = "Registration-Delivery-Id";

/// Longest header value written on a dead letter, in characters.
const MAX_HEADER_VALUE_CHARS: usize = 512;

fn nats_err(context: &str, e: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::Nats(format!("{context}: {e}"))
}

/// Make free text safe for a NATS header value. Control characters would
/// break the header block, so each becomes a space; long text is truncated.
pub fn header_value(text: &str) -> String {
    text.chars()
        .take(MAX_HEADER_VALUE_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct JetStreamTransport {
    context: jetstream::Context,
    dead_letter_subject: String,
    messages: tokio::sync::Mutex<pull::Stream>,
    /// Deliveries handed out and not yet settled, keyed by delivery id.
    in_flight: Mutex<HashMap<String, jetstream::Message>>,
}

impl JetStreamTransport {
    /// Ensure the work and dead-letter streams exist, bind the durable pull
    /// consumer and open its message stream.
    pub async fn connect(
        context: jetstream::Context,
        config: &NatsConfig,
    ) -> RegistrationResult<Self> {
        let work = context
            .get_or_create_stream(stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| nats_err("creating work stream", e))?;

        context
            .get_or_create_stream(stream::Config {
                name: config.dead_letter_stream.clone(),
                subjects: vec![config.dead_letter_subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| nats_err("creating dead-letter stream", e))?;

        let consumer = work
            .get_or_create_consumer(
                &config.durable_name,
                pull::Config {
                    durable_name: Some(config.durable_name.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ack_wait: Duration::from_secs(config.ack_wait_secs),
                    max_deliver: -1,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| nats_err("binding consumer", e))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| nats_err("opening message stream", e))?;

        info!(
            stream = %config.stream_name,
            subject = %config.subject,
            durable = %config.durable_name,
            "JetStream consumer bound"
        );

        Ok(Self {
            context,
            dead_letter_subject: config.dead_letter_subject.clone(),
            messages: tokio::sync::Mutex::new(messages),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Remove a delivery from the in-flight map. A failed settle does not put
    /// it back: JetStream redelivers it after `ack_wait`, possibly to another
    /// consumer bound to the same durable.
    fn take(&self, delivery: &Delivery) -> RegistrationResult<jetstream::Message> {
        self.in_flight.lock().remove(&delivery.id).ok_or_else(|| {
            RegistrationError::Transport(format!("delivery {} is not in flight", delivery.id))
        })
    }
}

#[async_trait]
impl QueueTransport for JetStreamTransport {
    async fn receive(&self) -> RegistrationResult<Option<Delivery>> {
        let next = self.messages.lock().await.next().await;

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(nats_err("receiving", e)),
            None => return Ok(None),
        };

        let (id, attempt) = {
            let info = message.info().map_err(|e| nats_err("reading message info", e))?;
            (
                info.stream_sequence.to_string(),
                u32::try_from(info.delivered).unwrap_or(u32::MAX),
            )
        };

        let delivery = Delivery::new(id.clone(), attempt, message.message.payload.clone());
        debug!(delivery_id = %id, attempt, "Received delivery");
        self.in_flight.lock().insert(id, message);

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> RegistrationResult<()> {
        let message = self.take(delivery)?;
        message.ack().await.map_err(|e| nats_err("ack", e))
    }

    async fn nack_requeue(&self, delivery: &Delivery, delay: Duration) -> RegistrationResult<()> {
        let message = self.take(delivery)?;
        message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| nats_err("nak", e))
    }

    async fn nack_dead_letter(
        &self,
        delivery: &Delivery,
        reason: &str,
        detail: &str,
    ) -> RegistrationResult<()> {
        let message = self.take(delivery)?;

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_REASON, header_value(reason).as_str());
        headers.insert(HEADER_DETAIL, header_value(detail).as_str());
        headers.insert(HEADER_DELIVERY, delivery.id.as_str());

        let published = match self
            .context
            .publish_with_headers(
                self.dead_letter_subject.clone(),
                headers,
                delivery.payload.clone(),
            )
            .await
        {
            Ok(ack) => ack.await.map(|_| ()).map_err(|e| nats_err("dead-letter publish ack", e)),
            Err(e) => Err(nats_err("dead-letter publish", e)),
        };

        if let Err(e) = published {
            // Leave the entry on the work stream; it is redelivered after ack_wait.
            warn!(delivery_id = %delivery.id, error = %e, "Dead-letter publish failed");
            return Err(e);
        }

        message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| nats_err("term", e))
    }
}
