//! HTTP client for the Mobile Commons REST API.
//!
//! Every outbound call is a single form POST. Failures are categorized from
//! the reqwest error kind or the HTTP status so the classifier can decide
//! between replay and dead-letter without inspecting message text.

use crate::service::ProviderHttpClient;
use async_trait::async_trait;
use regmobile_core::config::{MobileCommonsConfig, MobileCommonsCredentials};
use regmobile_core::error::{RegistrationError, RegistrationResult};
use regmobile_core::provider::{
    FailureCategory, ProviderRequest, ProviderResponse, SubmissionFailure, SubmissionResult,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const PROFILE_UPDATE_PATH: &str = "profile_update";

/// `<response success="true|false"><error id=".." message=".."/></response>`
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "@success", default)]
    success: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "@message", default)]
    message: Option<String>,
}

/// Parse a `profile_update` response body.
pub fn parse_response(body: &str) -> Result<ProviderResponse, quick_xml::de::DeError> {
    let parsed: ApiResponse = quick_xml::de::from_str(body)?;

    let success = parsed
        .success
        .as_deref()
        .map(|s| s.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let error_message = parsed.error.map(|e| match (e.message, e.id) {
        (Some(message), _) => message,
        (None, Some(id)) => format!("error {id}"),
        (None, None) => "unspecified error".to_string(),
    });

    Ok(ProviderResponse {
        success,
        error_message,
    })
}

/// Map a transport error onto a failure category.
pub fn categorize(error: &reqwest::Error) -> FailureCategory {
    if error.is_connect() && error.is_timeout() {
        FailureCategory::ConnectionTimeout
    } else if error.is_connect() {
        FailureCategory::ConnectFailed
    } else if error.is_timeout() {
        FailureCategory::OperationTimeout
    } else if error.status().is_some_and(|s| s.is_server_error()) {
        FailureCategory::ServerError
    } else {
        FailureCategory::Unknown
    }
}

pub struct MobileCommonsClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: MobileCommonsCredentials,
}

impl MobileCommonsClient {
    pub fn new(
        config: &MobileCommonsConfig,
        credentials: MobileCommonsCredentials,
    ) -> RegistrationResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RegistrationError::Config(format!("invalid Mobile Commons base_url: {e}"))
        })?;
        let endpoint = base
            .join(PROFILE_UPDATE_PATH)
            .map_err(|e| RegistrationError::Config(format!("invalid endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| RegistrationError::Provider(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn form<'a>(&'a self, request: &'a ProviderRequest) -> Vec<(&'a str, &'a str)> {
        let mut form: Vec<(&str, &str)> = request
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(key) = self.credentials.company_key.as_deref() {
            form.push(("company_key", key));
        }
        form
    }
}

#[async_trait]
impl ProviderHttpClient for MobileCommonsClient {
    async fn submit(&self, provider_name: &str, request: &ProviderRequest) -> SubmissionResult {
        debug!(
            provider = provider_name,
            endpoint = %self.endpoint,
            fields = request.fields.len(),
            "Submitting profile update"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .form(&self.form(request))
            .send()
            .await
            .map_err(|e| {
                let category = categorize(&e);
                warn!(provider = provider_name, category = %category, error = %e, "Submission failed");
                SubmissionFailure::new(category, e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            warn!(provider = provider_name, status = %status, "Provider returned server error");
            return Err(SubmissionFailure::new(
                FailureCategory::ServerError,
                format!("HTTP {status}"),
            ));
        }
        if !status.is_success() {
            warn!(provider = provider_name, status = %status, "Provider returned unexpected status");
            return Err(SubmissionFailure::new(
                FailureCategory::Unknown,
                format!("HTTP {status}"),
            ));
        }

        let body = response.text().await.map_err(|e| {
            let category = categorize(&e);
            SubmissionFailure::new(category, format!("reading body: {e}"))
        })?;

        let parsed = parse_response(&body).map_err(|e| {
            warn!(provider = provider_name, error = %e, "Unparseable provider response");
            SubmissionFailure::new(FailureCategory::Unknown, format!("unparseable response: {e}"))
        })?;

        if parsed.is_soft_error() {
            warn!(
                provider = provider_name,
                message = parsed.error_message.as_deref().unwrap_or(""),
                "Provider rejected profile update"
            );
        } else {
            info!(provider = provider_name, "Profile update accepted");
        }

        Ok(parsed)
    }
}
