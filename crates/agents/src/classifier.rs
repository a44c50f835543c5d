//! Outcome classification: turns a submission result or a rejection into
//! exactly one queue action.
//!
//! | Input                              | Outcome                                   |
//! |------------------------------------|-------------------------------------------|
//! | success, no embedded error         | `Acknowledge`                             |
//! | soft error                         | per `soft_error_policy`                   |
//! | transient failure                  | `RetryLater{delay_secs}`                  |
//! | transient failure, attempts spent  | `DeadLetter{"retries_exhausted"}`         |
//! | `Unknown` failure                  | `DeadLetter{"unclassified"}`              |
//! | configuration-defect rejection     | `DeadLetter{code}`                        |
//! | any other rejection                | `Acknowledge`                             |

use regmobile_core::config::{RetryConfig, SoftErrorPolicy};
use regmobile_core::outcome::{ProcessingOutcome, RejectionReason};
use regmobile_core::provider::SubmissionResult;

pub const REASON_UNCLASSIFIED: &str = "unclassified";
pub const REASON_RETRIES_EXHAUSTED: &str = "retries_exhausted";
pub const REASON_PROVIDER_REJECTED: &str = "provider_rejected";

#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    retry_delay_secs: u64,
    max_attempts: u32,
    soft_error_policy: SoftErrorPolicy,
}

impl OutcomeClassifier {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            retry_delay_secs: config.delay_secs,
            max_attempts: config.max_attempts,
            soft_error_policy: config.soft_error_policy,
        }
    }

    /// Classify a provider submission. `attempt` is the 1-based delivery
    /// count of the message being processed.
    pub fn classify(&self, result: &SubmissionResult, attempt: u32) -> ProcessingOutcome {
        match result {
            Ok(response) if !response.is_soft_error() => ProcessingOutcome::Acknowledge,
            Ok(response) => match self.soft_error_policy {
                SoftErrorPolicy::Acknowledge => ProcessingOutcome::Acknowledge,
                SoftErrorPolicy::DeadLetter => ProcessingOutcome::dead_letter(
                    REASON_PROVIDER_REJECTED,
                    response
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                ),
            },
            Err(failure) if failure.category.is_transient() => {
                if self.attempts_exhausted(attempt) {
                    ProcessingOutcome::dead_letter(
                        REASON_RETRIES_EXHAUSTED,
                        format!("{failure} (after {attempt} attempts)"),
                    )
                } else {
                    ProcessingOutcome::RetryLater {
                        delay_seconds: self.retry_delay_secs,
                    }
                }
            }
            Err(failure) => ProcessingOutcome::dead_letter(REASON_UNCLASSIFIED, failure.message.clone()),
        }
    }

    /// Classify a message that never reached a provider.
    pub fn classify_rejection(&self, reason: &RejectionReason) -> ProcessingOutcome {
        if reason.is_configuration_defect() {
            ProcessingOutcome::dead_letter(reason.code(), reason.to_string())
        } else {
            ProcessingOutcome::Acknowledge
        }
    }

    fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
