//! End-to-end registration flow: in-memory queue, the full pipeline and a
//! scripted provider HTTP client.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use regmobile_agents::{
        Delivery, InMemoryTransport, OutcomeClassifier, RegistrationConsumer, RegistrationProcessor,
    };
    use regmobile_core::config::{AppConfig, RetryConfig, SoftErrorPolicy};
    use regmobile_core::event_bus::{capture_sink, CaptureSink, PipelineEventType};
    use regmobile_core::outcome::ProcessingOutcome;
    use regmobile_core::provider::{
        FailureCategory, ProviderKind, ProviderRequest, ProviderResponse, SubmissionFailure,
        SubmissionResult,
    };
    use regmobile_ingest::{EligibilityValidator, ProfileNormalizer};
    use regmobile_providers::{MobileCommonsService, ProviderHttpClient, ProviderSelector};
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns scripted results in order, then success once the script runs out.
    struct ScriptedClient {
        script: Mutex<VecDeque<SubmissionResult>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedClient {
        fn with(results: Vec<SubmissionResult>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ProviderHttpClient for ScriptedClient {
        async fn submit(&self, _provider_name: &str, request: &ProviderRequest) -> SubmissionResult {
            self.requests.lock().push(request.clone());
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(ProviderResponse::ok()))
        }
    }

    struct Harness {
        transport: Arc<InMemoryTransport>,
        client: Arc<ScriptedClient>,
        sink: Arc<CaptureSink>,
        processor: Arc<RegistrationProcessor>,
    }

    impl Harness {
        fn new(results: Vec<SubmissionResult>, retry: RetryConfig) -> Self {
            let config = AppConfig::default();
            let client = ScriptedClient::with(results);

            // routes for every supported application, but only US has an instance
            let mut selector = ProviderSelector::new(config.routing.routes.clone());
            selector.register(
                "US",
                Arc::new(MobileCommonsService::new(client.clone(), &config.mobile_commons)),
            );

            let sink = capture_sink();
            let processor = RegistrationProcessor::new(
                ProfileNormalizer::new(&config.normalizer),
                EligibilityValidator::new(&config.eligibility),
                selector,
                OutcomeClassifier::new(&retry),
                sink.clone(),
            );

            Self {
                transport: Arc::new(InMemoryTransport::new()),
                client,
                sink,
                processor: Arc::new(processor),
            }
        }

        fn with_results(results: Vec<SubmissionResult>) -> Self {
            Self::new(results, RetryConfig::default())
        }

        fn consumer(&self) -> RegistrationConsumer {
            RegistrationConsumer::new(
                "test-consumer-00".into(),
                "test".into(),
                self.processor.clone(),
                self.transport.clone(),
            )
        }

        /// Consume until the in-memory queue is drained.
        async fn run(&self) {
            self.consumer().run().await;
        }
    }

    fn valid_registration() -> serde_json::Value {
        json!({
            "application_id": "US",
            "mobile": "2125550100",
            "mc_opt_in_path_id": "42"
        })
    }

    fn timeout() -> SubmissionResult {
        Err(SubmissionFailure::new(
            FailureCategory::ConnectionTimeout,
            "connection timed out",
        ))
    }

    #[tokio::test]
    async fn test_success_acknowledges_with_exact_request() {
        let h = Harness::with_results(vec![Ok(ProviderResponse::ok())]);
        h.transport.push_json(&valid_registration());
        h.run().await;

        assert_eq!(h.transport.acked().len(), 1);
        assert!(h.transport.requeued().is_empty());
        assert!(h.transport.dead_letters().is_empty());

        let requests = h.client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].provider, ProviderKind::MobileCommons);
        assert_eq!(
            requests[0].fields,
            BTreeMap::from([
                ("phone_number".to_string(), "2125550100".to_string()),
                ("opt_in_path_id".to_string(), "42".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn test_connection_timeout_retries_then_succeeds() {
        let h = Harness::with_results(vec![timeout(), Ok(ProviderResponse::ok())]);
        let id = h.transport.push_json(&valid_registration());
        h.run().await;

        let requeued = h.transport.requeued();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].0.id, id);
        assert_eq!(requeued[0].1, Duration::from_secs(20));

        let acked = h.transport.acked();
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].id, id);
        assert_eq!(acked[0].attempt, 2);

        assert_eq!(h.client.requests().len(), 2);
        assert_eq!(h.sink.count_type(PipelineEventType::RetryScheduled), 1);
        assert_eq!(h.sink.count_type(PipelineEventType::Succeeded), 1);
    }

    #[tokio::test]
    async fn test_identical_redelivery_is_processed_as_new() {
        let h = Harness::with_results(vec![timeout(), Ok(ProviderResponse::ok())]);
        let consumer = h.consumer();

        let payload = valid_registration().to_string();
        let first = consumer.process_one(&Delivery::new("42", 1, payload.clone())).await;
        let second = consumer.process_one(&Delivery::new("42", 1, payload)).await;

        assert_eq!(first, ProcessingOutcome::RetryLater { delay_seconds: 20 });
        assert_eq!(second, ProcessingOutcome::Acknowledge);
    }

    #[tokio::test]
    async fn test_missing_application_id_is_acknowledged_without_submission() {
        let h = Harness::with_results(vec![]);
        h.transport
            .push_json(&json!({ "mobile": "2125550100", "mc_opt_in_path_id": "42" }));
        h.run().await;

        assert_eq!(h.transport.acked().len(), 1);
        assert!(h.transport.requeued().is_empty());
        assert!(h.transport.dead_letters().is_empty());
        assert!(h.client.requests().is_empty());
        assert_eq!(h.sink.count_type(PipelineEventType::Skipped), 1);
    }

    #[tokio::test]
    async fn test_unknown_failure_dead_letters_with_detail() {
        let h = Harness::with_results(vec![Err(SubmissionFailure::new(
            FailureCategory::Unknown,
            "HTTP 401 Unauthorized",
        ))]);
        h.transport.push_json(&valid_registration());
        h.run().await;

        let dead = h.transport.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "unclassified");
        assert_eq!(dead[0].detail, "HTTP 401 Unauthorized");
        assert!(h.transport.acked().is_empty());
        assert_eq!(h.sink.count_type(PipelineEventType::DeadLettered), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_dead_letters() {
        let h = Harness::with_results(vec![]);
        h.transport.push_json(&json!({
            "application_id": "CA",
            "user_country": "CA",
            "mobile": "4165550100",
            "mc_opt_in_path_id": "7"
        }));
        h.run().await;

        let dead = h.transport.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "provider_not_configured");
        assert!(h.client.requests().is_empty());
        assert_eq!(h.sink.count_type(PipelineEventType::RoutingFailed), 1);
    }

    #[tokio::test]
    async fn test_soft_error_acknowledged_by_default() {
        let h = Harness::with_results(vec![Ok(ProviderResponse::rejected("Invalid opt-in path"))]);
        h.transport.push_json(&valid_registration());
        h.run().await;

        assert_eq!(h.transport.acked().len(), 1);
        assert_eq!(h.sink.count_type(PipelineEventType::SoftError), 1);
    }

    #[tokio::test]
    async fn test_soft_error_dead_letter_policy() {
        let h = Harness::new(
            vec![Ok(ProviderResponse::rejected("Invalid opt-in path"))],
            RetryConfig {
                soft_error_policy: SoftErrorPolicy::DeadLetter,
                ..Default::default()
            },
        );
        h.transport.push_json(&valid_registration());
        h.run().await;

        let dead = h.transport.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "provider_rejected");
        assert_eq!(dead[0].detail, "Invalid opt-in path");
    }

    #[tokio::test]
    async fn test_retries_exhausted_escalates_to_dead_letter() {
        let failures = (0..5)
            .map(|_| {
                Err(SubmissionFailure::new(
                    FailureCategory::ServerError,
                    "HTTP 503",
                ))
            })
            .collect();
        let h = Harness::new(
            failures,
            RetryConfig {
                max_attempts: 3,
                ..Default::default()
            },
        );
        h.transport.push_json(&valid_registration());
        h.run().await;

        assert_eq!(h.transport.requeued().len(), 2);
        let dead = h.transport.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "retries_exhausted");
        assert_eq!(dead[0].delivery.attempt, 3);
        assert_eq!(h.client.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_acknowledged() {
        let h = Harness::with_results(vec![]);
        h.transport.push("{not json");
        h.run().await;

        assert_eq!(h.transport.acked().len(), 1);
        assert_eq!(h.sink.count_type(PipelineEventType::MalformedPayload), 1);
        assert!(h.client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_aliases_flow_into_provider_request() {
        let h = Harness::with_results(vec![]);
        h.transport.push_json(&json!({
            "application_id": "US",
            "user_country": "US",
            "mobile_number": "(212) 555-0100",
            "mobile_opt_in_path_id": 99,
            "first_name": "Alice",
            "merge_vars": { "FNAME": "Alex" },
            "zip": "11201",
            "birthdate_timestamp": 946684800
        }));
        h.run().await;

        assert_eq!(h.transport.acked().len(), 1);
        let requests = h.client.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.get("phone_number"), Some("(212) 555-0100"));
        assert_eq!(request.get("opt_in_path_id"), Some("99"));
        assert_eq!(request.get("first_name"), Some("Alex"));
        assert_eq!(request.get("postal_code"), Some("11201"));
        assert_eq!(request.get("birthdate"), Some("2000-01-01"));
        assert_eq!(request.get("BirthYear"), Some("2000"));
    }
}
