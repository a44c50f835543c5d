//! Provider-facing types: which downstream service handles a profile, the
//! request shape sent to it, and the two ways a submission can come back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Downstream mobile-marketing providers a profile can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    MobileCommons,
}

impl ProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::MobileCommons => "Mobile Commons",
        }
    }

    /// Stable label for metrics and dead-letter headers.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::MobileCommons => "mobile_commons",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Provider-specific reshaping of a profile. Built fresh per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub provider: ProviderKind,
    pub fields: BTreeMap<String, String>,
}

impl ProviderRequest {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set `key` only when `value` is present.
    pub fn set_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.fields.insert(key.to_string(), v.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// What a provider said about a submission it accepted at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub success: bool,
    pub error_message: Option<String>,
}

impl ProviderResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }

    /// The provider answered but flagged the update as not applied.
    pub fn is_soft_error(&self) -> bool {
        !self.success || self.error_message.is_some()
    }
}

/// Category of a failed submission, assigned by the HTTP client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ConnectionTimeout,
    OperationTimeout,
    ConnectFailed,
    ServerError,
    Unknown,
}

impl FailureCategory {
    /// Failures that may succeed if the same message is replayed later.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FailureCategory::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::ConnectionTimeout => "connection_timeout",
            FailureCategory::OperationTimeout => "operation_timeout",
            FailureCategory::ConnectFailed => "connect_failed",
            FailureCategory::ServerError => "server_error",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A submission that did not produce a provider response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct SubmissionFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl SubmissionFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

pub type SubmissionResult = Result<ProviderResponse, SubmissionFailure>;
