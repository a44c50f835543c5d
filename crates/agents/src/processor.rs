//! Registration pipeline: decodes a delivery, normalizes and validates the
//! profile, selects a provider, submits, and classifies the result into one
//! queue action. Every path ends in exactly one `ProcessingOutcome`.

use crate::classifier::OutcomeClassifier;
use crate::transport::Delivery;
use regmobile_core::config::AppConfig;
use regmobile_core::error::RegistrationResult;
use regmobile_core::event_bus::{EventSink, PipelineEvent, PipelineEventType};
use regmobile_core::outcome::{ProcessingOutcome, RejectionReason};
use regmobile_core::provider::ProviderKind;
use regmobile_core::types::{NormalizedProfile, RawMessage};
use regmobile_ingest::{EligibilityValidator, ProfileNormalizer};
use regmobile_providers::ProviderSelector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct RegistrationProcessor {
    normalizer: ProfileNormalizer,
    validator: EligibilityValidator,
    selector: ProviderSelector,
    classifier: OutcomeClassifier,
    events: Arc<dyn EventSink>,
}

impl RegistrationProcessor {
    pub fn new(
        normalizer: ProfileNormalizer,
        validator: EligibilityValidator,
        selector: ProviderSelector,
        classifier: OutcomeClassifier,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            normalizer,
            validator,
            selector,
            classifier,
            events,
        }
    }

    pub fn from_config(config: &AppConfig, events: Arc<dyn EventSink>) -> RegistrationResult<Self> {
        Ok(Self::new(
            ProfileNormalizer::new(&config.normalizer),
            EligibilityValidator::new(&config.eligibility),
            ProviderSelector::from_config(config)?,
            OutcomeClassifier::new(&config.retry),
            events,
        ))
    }

    /// Run one delivery through the pipeline. Never fails: every error is
    /// resolved into an outcome.
    pub async fn process(&self, delivery: &Delivery) -> ProcessingOutcome {
        let start = Instant::now();
        metrics::counter!("registration.received").increment(1);

        let raw = match RawMessage::from_slice(&delivery.payload) {
            Ok(raw) => raw,
            Err(e) => {
                let reason = RejectionReason::MalformedPayload(e.to_string());
                self.reject(delivery, None, PipelineEventType::MalformedPayload, &reason);
                let outcome = self.classifier.classify_rejection(&reason);
                return self.finish(delivery, None, None, outcome, start);
            }
        };

        let profile = self.normalizer.normalize(&raw);
        let application_id = profile.application_id();

        if let Err(reason) = self.validator.can_process(&profile) {
            self.reject(delivery, application_id, PipelineEventType::Skipped, &reason);
            let outcome = self.classifier.classify_rejection(&reason);
            return self.finish(delivery, application_id, None, outcome, start);
        }

        log_consumption(delivery, &profile);

        let service = match self.selector.select(&profile) {
            Ok(service) => service,
            Err(reason) => {
                self.reject(delivery, application_id, PipelineEventType::RoutingFailed, &reason);
                let outcome = self.classifier.classify_rejection(&reason);
                return self.finish(delivery, application_id, None, outcome, start);
            }
        };
        let provider = service.kind();

        if let Err(reason) = service.can_process(&profile) {
            self.events.emit(
                PipelineEvent::new(PipelineEventType::ProviderSkipped, delivery.id.as_str())
                    .application(application_id)
                    .provider(provider.label())
                    .reason(reason.code())
                    .detail(reason.to_string()),
            );
            metrics::counter!("registration.skipped", "reason" => reason.code()).increment(1);
            let outcome = self.classifier.classify_rejection(&reason);
            return self.finish(delivery, application_id, Some(provider), outcome, start);
        }

        let request = service.build_request(&profile);
        self.events.emit(
            PipelineEvent::new(PipelineEventType::Submitted, delivery.id.as_str())
                .application(application_id)
                .provider(provider.label()),
        );
        metrics::counter!("registration.submitted", "provider" => provider.label()).increment(1);

        let submit_start = Instant::now();
        let result = service.submit(&request).await;
        metrics::histogram!("provider.latency_ms", "provider" => provider.label())
            .record(submit_start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(response) if !response.is_soft_error() => {
                self.events.emit(
                    PipelineEvent::new(PipelineEventType::Succeeded, delivery.id.as_str())
                        .application(application_id)
                        .provider(provider.label()),
                );
            }
            Ok(response) => {
                let mut event = PipelineEvent::new(PipelineEventType::SoftError, delivery.id.as_str())
                    .application(application_id)
                    .provider(provider.label());
                if let Some(message) = &response.error_message {
                    event = event.detail(message.clone());
                }
                self.events.emit(event);
                metrics::counter!("provider.soft_errors", "provider" => provider.label()).increment(1);
            }
            Err(failure) => {
                debug!(
                    delivery_id = %delivery.id,
                    category = %failure.category,
                    error = %failure.message,
                    "Provider submission failed"
                );
                metrics::counter!(
                    "provider.failures",
                    "provider" => provider.label(),
                    "category" => failure.category.label()
                )
                .increment(1);
            }
        }

        let outcome = self.classifier.classify(&result, delivery.attempt);
        self.finish(delivery, application_id, Some(provider), outcome, start)
    }

    fn reject(
        &self,
        delivery: &Delivery,
        application_id: Option<&str>,
        event_type: PipelineEventType,
        reason: &RejectionReason,
    ) {
        self.events.emit(
            PipelineEvent::new(event_type, delivery.id.as_str())
                .application(application_id)
                .reason(reason.code())
                .detail(reason.to_string()),
        );
        metrics::counter!("registration.skipped", "reason" => reason.code()).increment(1);
    }

    fn finish(
        &self,
        delivery: &Delivery,
        application_id: Option<&str>,
        provider: Option<ProviderKind>,
        outcome: ProcessingOutcome,
        start: Instant,
    ) -> ProcessingOutcome {
        let event = match &outcome {
            ProcessingOutcome::Acknowledge => None,
            ProcessingOutcome::RetryLater { delay_seconds } => Some(
                PipelineEvent::new(PipelineEventType::RetryScheduled, delivery.id.as_str())
                    .detail(format!("attempt {} retry in {delay_seconds}s", delivery.attempt)),
            ),
            ProcessingOutcome::DeadLetter {
                reason_code,
                detail,
            } => Some(
                PipelineEvent::new(PipelineEventType::DeadLettered, delivery.id.as_str())
                    .reason(reason_code.clone())
                    .detail(detail.clone()),
            ),
        };

        if let Some(mut event) = event {
            event = event.application(application_id);
            if let Some(provider) = provider {
                event = event.provider(provider.label());
            }
            self.events.emit(event);
        }

        metrics::counter!("registration.outcome", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("registration.processing_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        outcome
    }
}

fn log_consumption(delivery: &Delivery, profile: &NormalizedProfile) {
    match profile.user_country.as_deref() {
        Some(country) => info!(
            delivery_id = %delivery.id,
            mobile = profile.mobile().unwrap_or_default(),
            user_country = %country,
            activity = profile.activity.as_deref().unwrap_or(""),
            "Consuming registration"
        ),
        None => info!(
            delivery_id = %delivery.id,
            mobile = profile.mobile().unwrap_or_default(),
            activity = profile.activity.as_deref().unwrap_or(""),
            "Consuming registration, user_country not set"
        ),
    }
}
