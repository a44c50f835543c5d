//! Provider seams: the per-provider service contract and the HTTP client
//! collaborator it delegates network calls to.

use async_trait::async_trait;
use regmobile_core::outcome::RejectionReason;
use regmobile_core::provider::{ProviderKind, ProviderRequest, SubmissionResult};
use regmobile_core::types::NormalizedProfile;

/// One downstream mobile-marketing provider.
///
/// `submit` performs exactly one outbound call and never retries; retry is
/// decided for the whole message by the outcome classifier.
#[async_trait]
pub trait ProviderService: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider-specific eligibility, checked before any network call.
    fn can_process(&self, profile: &NormalizedProfile) -> Result<(), RejectionReason>;

    /// Reshape a profile into the provider's request fields.
    fn build_request(&self, profile: &NormalizedProfile) -> ProviderRequest;

    async fn submit(&self, request: &ProviderRequest) -> SubmissionResult;
}

/// Transport to a provider's REST API. Implementations assign the failure
/// category from the transport error itself, never from message text.
#[async_trait]
pub trait ProviderHttpClient: Send + Sync {
    async fn submit(&self, provider_name: &str, request: &ProviderRequest) -> SubmissionResult;
}
