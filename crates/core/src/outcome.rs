//! Per-message processing outcomes and the reasons a message never reaches
//! a provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tagged result of one pipeline run. Exactly one per delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Acknowledge,
    RetryLater { delay_seconds: u64 },
    DeadLetter { reason_code: String, detail: String },
}

impl ProcessingOutcome {
    pub fn dead_letter(reason_code: impl Into<String>, detail: impl Into<String>) -> Self {
        ProcessingOutcome::DeadLetter {
            reason_code: reason_code.into(),
            detail: detail.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Acknowledge => "acknowledge",
            ProcessingOutcome::RetryLater { .. } => "retry_later",
            ProcessingOutcome::DeadLetter { .. } => "dead_letter",
        }
    }
}

/// Why a message was not submitted to a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("payload is not a JSON object: {0}")]
    MalformedPayload(String),

    #[error("application_id not set")]
    MissingApplicationId,

    #[error("unsupported application: {0}")]
    UnsupportedApplication(String),

    #[error("unsupported user_country: {0}")]
    UnsupportedCountry(String),

    #[error("mobile number not defined")]
    MissingMobile,

    #[error("invalid phone number for the North American Numbering Plan: {0}")]
    InvalidMobile(String),

    #[error("service_path_id (opt-in path) not set for mobile {0}")]
    MissingServicePath(String),

    #[error("no provider route for application {application_id} (user_country: {user_country:?})")]
    NoProviderRoute {
        application_id: String,
        user_country: Option<String>,
    },

    #[error("{provider} has no credentials for affiliate {affiliate}")]
    ProviderNotConfigured { provider: String, affiliate: String },
}

impl RejectionReason {
    /// Stable snake_case code used in events, metrics and dead-letter headers.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::MalformedPayload(_) => "malformed_payload",
            RejectionReason::MissingApplicationId => "missing_application_id",
            RejectionReason::UnsupportedApplication(_) => "unsupported_application",
            RejectionReason::UnsupportedCountry(_) => "unsupported_country",
            RejectionReason::MissingMobile => "missing_mobile",
            RejectionReason::InvalidMobile(_) => "invalid_mobile",
            RejectionReason::MissingServicePath(_) => "missing_service_path",
            RejectionReason::NoProviderRoute { .. } => "no_provider_route",
            RejectionReason::ProviderNotConfigured { .. } => "provider_not_configured",
        }
    }

    /// Configuration defects, as opposed to invalid input. Replaying the
    /// message cannot help either, but these must stay visible.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            RejectionReason::NoProviderRoute { .. } | RejectionReason::ProviderNotConfigured { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(ProcessingOutcome::RetryLater { delay_seconds: 20 }).unwrap();
        assert_eq!(json["outcome"], "retry_later");
        assert_eq!(json["delay_seconds"], 20);

        let json = serde_json::to_value(ProcessingOutcome::dead_letter("unclassified", "boom")).unwrap();
        assert_eq!(json["outcome"], "dead_letter");
        assert_eq!(json["reason_code"], "unclassified");
    }

    #[test]
    fn test_configuration_defects() {
        let route = RejectionReason::NoProviderRoute {
            application_id: "FLF".into(),
            user_country: None,
        };
        assert!(route.is_configuration_defect());
        assert_eq!(route.code(), "no_provider_route");
        assert!(!RejectionReason::MissingMobile.is_configuration_defect());
        assert!(!RejectionReason::UnsupportedApplication("XX".into()).is_configuration_defect());
    }
}
