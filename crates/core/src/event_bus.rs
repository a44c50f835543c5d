//! Observability event bus: emit pipeline events from any stage.
//!
//! Together with the dead-letter store, this stream is what explains why a
//! given message never reached a provider. Stages accept an
//! `Arc<dyn EventSink>`; production wires a [`TracingSink`], tests a
//! [`CaptureSink`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    /// Payload could not be decoded into a message.
    MalformedPayload,
    /// Rejected by the eligibility policy; acknowledged and dropped.
    Skipped,
    /// No provider could be selected (configuration defect).
    RoutingFailed,
    /// Rejected by the selected provider before any network call.
    ProviderSkipped,
    Submitted,
    Succeeded,
    /// Provider answered but did not apply the update.
    SoftError,
    RetryScheduled,
    DeadLettered,
}

impl PipelineEventType {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineEventType::MalformedPayload => "malformed_payload",
            PipelineEventType::Skipped => "skipped",
            PipelineEventType::RoutingFailed => "routing_failed",
            PipelineEventType::ProviderSkipped => "provider_skipped",
            PipelineEventType::Submitted => "submitted",
            PipelineEventType::Succeeded => "succeeded",
            PipelineEventType::SoftError => "soft_error",
            PipelineEventType::RetryScheduled => "retry_scheduled",
            PipelineEventType::DeadLettered => "dead_lettered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_id: Uuid,
    pub event_type: PipelineEventType,
    pub delivery_id: String,
    pub application_id: Option<String>,
    pub provider: Option<String>,
    pub reason: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(event_type: PipelineEventType, delivery_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            delivery_id: delivery_id.into(),
            application_id: None,
            provider: None,
            reason: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn application(mut self, application_id: Option<&str>) -> Self {
        self.application_id = application_id.map(str::to_string);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Trait for emitting pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Sink that writes every event to the structured log at a level matching
/// its severity.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        let event_type = event.event_type.label();
        let application_id = event.application_id.as_deref().unwrap_or("-");
        let provider = event.provider.as_deref().unwrap_or("-");
        let reason = event.reason.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("-");

        match event.event_type {
            PipelineEventType::SoftError
            | PipelineEventType::DeadLettered
            | PipelineEventType::RoutingFailed => tracing::error!(
                event_id = %event.event_id,
                event_type,
                delivery_id = %event.delivery_id,
                application_id,
                provider,
                reason,
                detail,
                "Pipeline event"
            ),
            PipelineEventType::MalformedPayload
            | PipelineEventType::Skipped
            | PipelineEventType::ProviderSkipped
            | PipelineEventType::RetryScheduled => tracing::warn!(
                event_id = %event.event_id,
                event_type,
                delivery_id = %event.delivery_id,
                application_id,
                provider,
                reason,
                detail,
                "Pipeline event"
            ),
            PipelineEventType::Submitted | PipelineEventType::Succeeded => tracing::info!(
                event_id = %event.event_id,
                event_type,
                delivery_id = %event.delivery_id,
                application_id,
                provider,
                "Pipeline event"
            ),
        }
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: PipelineEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn event_types(&self) -> Vec<PipelineEventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn tracing_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
